use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use quire::stage::Stage;

mod cmd;

#[derive(Parser)]
#[command(name = "quire")]
#[command(version, about = "Staged editorial review for manuscripts")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a quire project in the current directory
    Init,
    /// Start a workflow for a manuscript
    Start { manuscript_id: String },
    /// Show a workflow report, or list all workflows
    Status {
        manuscript_id: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the current (or given) stage over a manuscript file
    Review {
        manuscript_id: String,
        file: PathBuf,
        /// Stage to run; defaults to the workflow's current stage
        #[arg(short, long)]
        stage: Option<Stage>,
        /// Reference notes for consistency checks; defaults to the stored series bible
        #[arg(short, long)]
        notes: Option<PathBuf>,
        /// Maximum concurrent backend calls
        #[arg(long)]
        max_concurrency: Option<usize>,
    },
    /// List the issues stored for a stage
    Issues {
        manuscript_id: String,
        stage: Stage,
        #[arg(long)]
        json: bool,
    },
    /// Apply selected fixes to a manuscript file
    Fix {
        manuscript_id: String,
        stage: Stage,
        file: PathBuf,
        /// Comma-separated issue ids, or "all"
        #[arg(short, long)]
        issues: String,
        /// Write the edited text here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract or show a manuscript's series bible
    Bible {
        #[command(subcommand)]
        command: BibleCommands,
    },
    /// Mark an issue as ignored
    Ignore {
        manuscript_id: String,
        stage: Stage,
        issue: u64,
    },
    /// Reopen an ignored issue
    Unignore {
        manuscript_id: String,
        stage: Stage,
        issue: u64,
    },
    /// Skip a stage
    Skip { manuscript_id: String, stage: Stage },
    /// Remove a manuscript's workflow, stored issues, change logs, bible and usage
    Reset { manuscript_id: String },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum BibleCommands {
    /// Extract characters, locations, timeline and objects from a manuscript
    Extract {
        manuscript_id: String,
        file: PathBuf,
        /// Also write the bible as markdown reference notes
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Maximum concurrent backend calls
        #[arg(long)]
        max_concurrency: Option<usize>,
    },
    /// Print the stored series bible
    Show {
        manuscript_id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default quire.toml file
    Init,
}

/// `RUST_LOG` wins; otherwise `warn`, or `debug` for quire with `--verbose`.
fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("quire=debug,warn")
            } else {
                EnvFilter::try_new("warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbose)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    };
    result.context("Failed to initialize logging")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose, cli.log_json)?;

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let open = |max_concurrency| cmd::Project::open(&project_dir, cli.verbose, max_concurrency);

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Start { manuscript_id } => cmd::cmd_start(&open(None)?, manuscript_id)?,
        Commands::Status {
            manuscript_id,
            json,
        } => cmd::cmd_status(&open(None)?, manuscript_id.as_deref(), *json)?,
        Commands::Review {
            manuscript_id,
            file,
            stage,
            notes,
            max_concurrency,
        } => {
            cmd::cmd_review(
                &open(*max_concurrency)?,
                manuscript_id,
                file,
                *stage,
                notes.as_deref(),
            )
            .await?
        }
        Commands::Issues {
            manuscript_id,
            stage,
            json,
        } => cmd::cmd_issues(&open(None)?, manuscript_id, *stage, *json)?,
        Commands::Fix {
            manuscript_id,
            stage,
            file,
            issues,
            output,
        } => {
            cmd::cmd_fix(
                &open(None)?,
                manuscript_id,
                *stage,
                file,
                issues,
                output.as_deref(),
            )
            .await?
        }
        Commands::Bible { command } => match command {
            BibleCommands::Extract {
                manuscript_id,
                file,
                output,
                max_concurrency,
            } => {
                cmd::cmd_bible_extract(
                    &open(*max_concurrency)?,
                    manuscript_id,
                    file,
                    output.as_deref(),
                )
                .await?
            }
            BibleCommands::Show {
                manuscript_id,
                json,
            } => cmd::cmd_bible_show(&open(None)?, manuscript_id, *json)?,
        },
        Commands::Ignore {
            manuscript_id,
            stage,
            issue,
        } => cmd::cmd_ignore(&open(None)?, manuscript_id, *stage, *issue)?,
        Commands::Unignore {
            manuscript_id,
            stage,
            issue,
        } => cmd::cmd_unignore(&open(None)?, manuscript_id, *stage, *issue)?,
        Commands::Skip {
            manuscript_id,
            stage,
        } => cmd::cmd_skip(&open(None)?, manuscript_id, *stage)?,
        Commands::Reset { manuscript_id } => cmd::cmd_reset(&open(None)?, manuscript_id)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
