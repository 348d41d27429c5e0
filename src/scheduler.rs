//! Daily scheduled sync

use crate::commands::{cmd_sync, SyncOverrides};
use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Build the cron job that runs one sync per trigger
pub fn build_job(config: &Config, db: &MetaDb) -> Result<Job> {
    let tz = config.schedule.tz()?;
    let cron = config.schedule.cron.clone();
    let config = config.clone();
    let db = db.clone();

    let job = Job::new_async_tz(cron.as_str(), tz, move |_uuid, _l| {
        let config = config.clone();
        let db = db.clone();
        Box::pin(async move {
            run_scheduled_sync(&config, &db).await;
        })
    })?;
    Ok(job)
}

/// Create and start the scheduler with the sync job registered
pub async fn start(config: &Config, db: &MetaDb) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await?;
    sched.add(build_job(config, db)?).await?;
    sched.start().await?;

    info!(
        cron = %config.schedule.cron,
        timezone = %config.schedule.timezone,
        "Scheduled Safety Gate sync"
    );
    Ok(sched)
}

/// Run one sync and log the outcome; failures are already recorded in the
/// loader state, so they are not propagated.
pub async fn run_scheduled_sync(config: &Config, db: &MetaDb) {
    info!("Scheduled Safety Gate sync triggered");
    match cmd_sync(config, db, SyncOverrides::default()).await {
        Ok(summary) => info!(
            run_id = %summary.run_id,
            processed = summary.processed,
            "Scheduled sync completed"
        ),
        Err(e) => error!(error = %e, "Scheduled sync failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    async fn setup() -> (Config, MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        let db = MetaDb::connect(&config).await.unwrap();
        (config, db, tmp)
    }

    #[tokio::test]
    async fn test_default_schedule_builds() {
        let (config, db, _tmp) = setup().await;
        assert!(build_job(&config, &db).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_cron_is_rejected() {
        let (mut config, db, _tmp) = setup().await;
        config.schedule.cron = "every day at noon".to_string();
        assert!(matches!(build_job(&config, &db), Err(Error::Scheduler(_))));
    }

    #[tokio::test]
    async fn test_invalid_timezone_is_rejected() {
        let (mut config, db, _tmp) = setup().await;
        config.schedule.timezone = "Mars/Olympus".to_string();
        assert!(matches!(build_job(&config, &db), Err(Error::Config(_))));
    }
}
