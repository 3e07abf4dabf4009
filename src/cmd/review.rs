//! Stage review and issue listing commands.

use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;

use quire::backend::UsageMeter;
use quire::cancel::CancellationRegistry;
use quire::errors::PipelineError;
use quire::issue::{Issue, IssueStatus, IssueSummary, Severity};
use quire::pipeline::Pipeline;
use quire::stage::Stage;

use super::Project;

pub async fn cmd_review(
    project: &Project,
    manuscript_id: &str,
    file: &Path,
    stage: Option<Stage>,
    notes: Option<&Path>,
) -> Result<()> {
    let state = project.load(manuscript_id)?;
    let stage = match stage.or_else(|| state.current_stage()) {
        Some(stage) => stage,
        None => bail!("Workflow for '{}' is already complete.", manuscript_id),
    };

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read manuscript: {}", file.display()))?;
    let notes = match notes {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read reference notes: {}", path.display()))?,
        ),
        None => match project.store.load_bible(manuscript_id)? {
            Some(sheet) if !sheet.is_empty() => {
                tracing::debug!(manuscript_id, "Using stored series bible as reference notes");
                Some(sheet.to_notes())
            }
            _ => None,
        },
    };

    let registry = CancellationRegistry::new();
    let meter = UsageMeter::new();
    let backend = project.config.build_backend(registry.clone(), meter.clone())?;
    let pipeline = Pipeline::new(
        project.editor.clone(),
        registry,
        backend,
        project.config.extraction_config(),
        project.config.fix_config(),
    );

    println!(
        "{} {} review of {} ({})",
        style("▶").cyan(),
        stage,
        style(manuscript_id).bold(),
        stage.reviewer()
    );

    let run = pipeline.run_stage(manuscript_id, stage, &text, notes.as_deref());
    tokio::pin!(run);
    let outcome = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            println!("{} Cancelling; waiting for the in-flight call to finish", style("!").yellow());
            pipeline.cancel(manuscript_id);
            run.await
        }
    };
    let usage = meter.snapshot();
    project.store.record_usage(manuscript_id, &usage)?;

    match outcome {
        Ok(run) => {
            project
                .store
                .save_issues(manuscript_id, stage, &run.issues)?;
            project.save(manuscript_id)?;

            println!(
                "{} {}: {}",
                style("✓").green(),
                stage,
                IssueSummary::from_issues(&run.issues)
            );
            print_issues(&run.issues);
            if !usage.is_empty() {
                println!("Usage: {}", usage);
            }
            match run.state.current_stage() {
                Some(next) => println!("Next stage: {}", next),
                None => println!("{}", style("Workflow complete").green()),
            }
            Ok(())
        }
        Err(PipelineError::Cancelled(_)) => {
            project.save(manuscript_id)?;
            bail!("Operation cancelled; {} was not completed", stage)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn cmd_issues(project: &Project, manuscript_id: &str, stage: Stage, json: bool) -> Result<()> {
    let issues = project.store.load_issues(manuscript_id, stage)?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&issues).context("Failed to serialize issues")?
        );
        return Ok(());
    }
    if issues.is_empty() {
        println!("No issues stored for {} / {}.", manuscript_id, stage);
        return Ok(());
    }

    let summary = IssueSummary::from_issues(&issues);
    println!();
    println!("{} / {}: {}", manuscript_id, stage, summary);
    println!(
        "  {} open, {} applied, {} ignored",
        summary.open, summary.applied, summary.ignored
    );
    print_issues(&issues);
    Ok(())
}

fn print_issues(issues: &[Issue]) {
    println!();
    for issue in issues {
        let severity = match issue.severity {
            Severity::Critical => style(issue.severity.as_str()).red().bold(),
            Severity::Major => style(issue.severity.as_str()).yellow(),
            Severity::Minor => style(issue.severity.as_str()).dim(),
        };
        let status = match issue.status {
            IssueStatus::Open => String::new(),
            other => format!(" [{}]", other),
        };
        println!(
            "  #{:<3} {:<8} {:<16} {}{}",
            issue.id,
            severity,
            issue.category,
            issue.location,
            style(status).dim()
        );
        if issue.bible_conflict {
            println!("       {}", style("BIBLE CONFLICT").red());
        }
        println!("       {}", issue.description);
        if !issue.original_text.is_empty() {
            println!("       text: \"{}\"", issue.original_text);
        }
        if !issue.suggestion.is_empty() {
            println!("       fix:  {}", issue.suggestion);
        }
    }
    println!();
}
