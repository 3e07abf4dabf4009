//! Configuration view and validation commands (`quire config`).

use anyhow::{Context, Result};
use std::path::Path;

use quire::config::{QuireConfig, QuireToml};

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config = QuireConfig::new(project_dir.to_path_buf())?;
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No quire.toml found at {}; using defaults.", config_path.display());
            }
            println!("Effective values (with env overrides):");
            println!();
            let rendered =
                toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("quire.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            std::fs::create_dir_all(&config.quire_dir).with_context(|| {
                format!("Failed to create {}", config.quire_dir.display())
            })?;
            QuireToml::default().save(&config_path)?;

            println!("Created quire.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [backend] kind, command, model, base_url");
            println!("  - [retry] max_attempts and backoff");
            println!("  - [extraction] chunk_size, max_concurrency");
            println!("  - [fixes] window_radius, temperature");
        }
    }

    Ok(())
}
