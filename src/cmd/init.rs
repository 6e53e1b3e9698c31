//! Project bootstrap command: `vibe init`.

use std::path::Path;

use anyhow::Result;
use vibe::config::VibeConfig;
use vibe::db::VibeDb;

pub fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        println!("{} already exists, keeping it.", config_path.display());
    } else {
        VibeConfig::default().save(config_path)?;
        println!("Created {}", config_path.display());
    }

    // Reload so env overrides such as VIBE_DB_PATH apply to the database path.
    let config = VibeConfig::load_or_default(config_path)?;
    VibeDb::open(&config.database.path)?;
    println!("Database ready at {}", config.database.path.display());

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!();
        println!("Before running the agent:");
        for warning in warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}
