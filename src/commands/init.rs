//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

/// Initialize safegate configuration and database
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::AlreadyInitialized(format!(
            "{} (use --force to overwrite)",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.paths.base_dir = base_dir.clone();
    config.paths.config_file = config_path;
    config.paths.db_file = base_dir.join("safegate.db");
    config.validate()?;

    std::fs::create_dir_all(&base_dir)?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    Ok(config)
}

/// Print init result to console
pub fn print_init(config: &Config) {
    println!("✓ Initialized safegate at {:?}", config.paths.base_dir);
    println!("\nConfiguration: {:?}", config.paths.config_file);
    println!("Database: {:?}", config.paths.db_file);
    println!("Dataset: {}", config.dataset.id);
    println!("\nNext steps:");
    println!("  safegate sync                 # Load recent Safety Gate alerts");
    println!("  safegate status               # Inspect loader state and data");
    println!("  safegate serve                # Run the scheduler and HTTP API");
}
