//! safegate CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use safegate::{
    check::ProductInput,
    commands::{
        cmd_check, cmd_init, cmd_serve, cmd_status, cmd_sync, print_check_result, print_init,
        print_status, print_sync_summary, InitOptions, ServeOptions, SyncOverrides,
    },
    config::Config,
    error::{Error, Result},
    meta::MetaDb,
};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "safegate")]
#[command(version, about = "Incremental Safety Gate alert sync and product safety checks", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize safegate configuration and database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Run one incremental sync of Safety Gate alerts
    Sync {
        /// Maximum pages to fetch in this run
        #[arg(long, env = "MAX_PAGES")]
        max_pages: Option<u32>,

        /// Records per page
        #[arg(long, env = "ROWS_PER_PAGE")]
        rows: Option<u32>,
    },

    /// Show loader state and stored alerts
    Status {
        /// Number of latest alerts to show
        #[arg(long, default_value = "5")]
        sample: u32,
    },

    /// Run the HTTP API and the daily sync schedule
    Serve {
        /// Address to listen on (overrides server.bind)
        #[arg(long, env = "SAFEGATE_BIND")]
        bind: Option<String>,

        /// Do not register the scheduled sync
        #[arg(long)]
        no_schedule: bool,
    },

    /// Check a product against recent alerts
    Check {
        /// Product name
        #[arg(long)]
        name: String,

        /// Product category (toys, electronics, ...)
        #[arg(long)]
        category: String,

        /// Product description
        #[arg(long)]
        description: String,

        /// URL of a product image
        #[arg(long)]
        image_url: Option<String>,

        /// Product brand
        #[arg(long)]
        brand: Option<String>,

        /// Product model
        #[arg(long)]
        model: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    // Handle init command specially (doesn't need existing config)
    if matches!(cli.command, Commands::Init { .. }) {
        return handle_init(cli).await;
    }

    // Handle completions command (doesn't need config/db)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "safegate", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = load_config(cli.config.as_deref())?;

    // Initialize components
    let db = MetaDb::connect(&config).await?;
    if !db.is_initialized().await? {
        return Err(Error::NotInitialized);
    }

    // Handle commands
    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Sync { max_pages, rows } => {
            let overrides = SyncOverrides {
                max_pages,
                rows_per_page: rows,
            };
            let summary = cmd_sync(&config, &db, overrides).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_sync_summary(&summary);
            }
        }

        Commands::Status { sample } => {
            let status = cmd_status(&config, &db, sample).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }

        Commands::Serve { bind, no_schedule } => {
            cmd_serve(config, db, ServeOptions { bind, no_schedule }).await?;
        }

        Commands::Check {
            name,
            category,
            description,
            image_url,
            brand,
            model,
        } => {
            let product = ProductInput {
                name,
                category,
                description,
                image_url,
                brand,
                model,
            };
            let label = product.name.clone();
            let result = cmd_check(&config, &db, product).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_check_result(&label, &result);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::NotInitialized);
    }

    Config::load(&config_path)
}

async fn handle_init(cli: Cli) -> Result<()> {
    let Commands::Init { force } = cli.command else {
        unreachable!()
    };

    // A .toml path names the config file; anything else is a base directory
    let (base_dir, config_path) = match cli.config {
        Some(path) if path.extension().map_or(false, |e| e == "toml") => {
            let base = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir);
            (base, path)
        }
        Some(dir) => (dir.clone(), dir.join("config.toml")),
        None => {
            let base = Config::default_base_dir();
            (base.clone(), base.join("config.toml"))
        }
    };

    let config = cmd_init(InitOptions {
        base_dir,
        config_path,
        force,
    })
    .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print_init(&config);
    }

    Ok(())
}
