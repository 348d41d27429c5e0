//! Sync command implementation

use crate::config::{Config, UPSTREAM_MAX_WINDOW};
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::sync::{
    DeltaLoader, OdsFetcher, RunSummary, SqliteAlertSink, SqliteWatermarkStore, SyncMode,
    SyncSettings,
};
use chrono::Utc;
use tracing::info;

/// Per-invocation limits from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOverrides {
    pub max_pages: Option<u32>,
    pub rows_per_page: Option<u32>,
}

impl SyncOverrides {
    fn apply(&self, settings: &mut SyncSettings) -> Result<()> {
        if let Some(max_pages) = self.max_pages {
            if max_pages == 0 {
                return Err(Error::InvalidInput("--max-pages must be positive".to_string()));
            }
            settings.max_pages = max_pages;
        }
        if let Some(rows) = self.rows_per_page {
            if rows == 0 || rows > UPSTREAM_MAX_WINDOW {
                return Err(Error::InvalidInput(format!(
                    "--rows must be between 1 and {}",
                    UPSTREAM_MAX_WINDOW
                )));
            }
            settings.rows_per_page = rows;
        }
        if u64::from(settings.rows_per_page) * u64::from(settings.max_pages)
            > u64::from(UPSTREAM_MAX_WINDOW)
        {
            return Err(Error::InvalidInput(format!(
                "{} pages of {} rows reach past the upstream window of {} records",
                settings.max_pages, settings.rows_per_page, UPSTREAM_MAX_WINDOW
            )));
        }
        Ok(())
    }
}

/// Run one delta sync against the configured dataset
pub async fn cmd_sync(config: &Config, db: &MetaDb, overrides: SyncOverrides) -> Result<RunSummary> {
    let mut settings = SyncSettings::from_config(config);
    overrides.apply(&mut settings)?;

    info!(
        dataset = %settings.dataset_id,
        rows = settings.rows_per_page,
        max_pages = settings.max_pages,
        "Starting Safety Gate sync"
    );

    let fetcher = OdsFetcher::new(&config.dataset, &config.http)?;
    let store = SqliteWatermarkStore::new(db.clone(), settings.dataset_id.clone());
    let mut sink = SqliteAlertSink::new(db.clone(), config.sync.batch_size);

    DeltaLoader::new(&fetcher, &store, settings)
        .run(&mut sink, Utc::now().date_naive())
        .await
}

/// Print a run summary to console
pub fn print_sync_summary(summary: &RunSummary) {
    let mode = match summary.mode {
        SyncMode::Bootstrap => "bootstrap",
        SyncMode::Delta => "delta",
    };

    println!("\n✓ Safety Gate sync completed\n");
    println!("Dataset: {}", summary.dataset_id);
    println!("Run: {}", summary.run_id);
    println!("Mode: {} ({})", mode, summary.filter);
    println!("Pages fetched: {}", summary.pages_fetched);
    println!("Records processed: {}", summary.processed);
    println!("Records skipped: {}", summary.skipped);
    println!("Stopped: {}", summary.stop_reason);
    match &summary.previous_watermark {
        Some(wm) => println!("Previous watermark: {}", wm),
        None => println!("Previous watermark: none"),
    }
    match &summary.watermark {
        Some(wm) if summary.watermark_advanced() => println!("Watermark: {} (advanced)", wm),
        Some(wm) => println!("Watermark: {} (unchanged)", wm),
        None => println!("Watermark: none"),
    }
    println!("Duration: {} ms", summary.duration_ms);
}
