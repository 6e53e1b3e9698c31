//! Configuration view and validation commands: `vibe config`.

use std::path::Path;

use anyhow::{Context, Result};
use vibe::config::VibeConfig;

use super::super::ConfigCommands;

pub fn cmd_config(
    config_path: &Path,
    config: &VibeConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!("# No config file at {}, using defaults", config_path.display());
            }
            println!("# Effective values (with env overrides, secrets masked)");
            println!();
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("Failed to render configuration")?;
            print!("{}", rendered);
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
    }
    Ok(())
}
