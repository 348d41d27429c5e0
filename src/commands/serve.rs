//! Serve command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::scheduler;
use crate::server;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub bind: Option<String>,
    pub no_schedule: bool,
}

/// Run the HTTP API and, unless disabled, the daily sync schedule
pub async fn cmd_serve(config: Config, db: MetaDb, options: ServeOptions) -> Result<()> {
    let bind = options.bind.unwrap_or_else(|| config.server.bind.clone());

    let scheduler = if config.schedule.enabled && !options.no_schedule {
        Some(scheduler::start(&config, &db).await?)
    } else {
        info!("Scheduled sync disabled");
        None
    };

    let result = server::serve(config, db, &bind).await;

    if let Some(mut sched) = scheduler {
        sched.shutdown().await?;
        info!("Scheduler stopped");
    }

    result
}
