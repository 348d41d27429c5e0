//! Run orchestration: one delta sync from IN_PROGRESS to SUCCESS or FAILURE

use super::{AlertSink, DeltaFilter, PageFetcher, QueryFilter, Watermark, WatermarkStore};
use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Limits and dataset details for one loader
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub dataset_id: String,
    pub alert_date_field: String,
    pub rows_per_page: u32,
    pub max_pages: u32,
    pub bootstrap_days: u32,
    pub verify_sort_order: bool,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dataset_id: config.dataset.id.clone(),
            alert_date_field: config.dataset.alert_date_field.clone(),
            rows_per_page: config.sync.rows_per_page,
            max_pages: config.sync.max_pages,
            bootstrap_days: config.sync.bootstrap_days,
            verify_sort_order: config.sync.verify_sort_order,
        }
    }
}

/// Whether the run started from a stored watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Bootstrap,
    Delta,
}

/// Why paging ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Upstream returned an empty page
    EndOfData,
    /// A record older than the watermark was reached
    ReachedWatermark,
    /// The page cap was hit; the remainder is left for later runs
    PageLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndOfData => write!(f, "end of data"),
            StopReason::ReachedWatermark => write!(f, "reached watermark"),
            StopReason::PageLimit => write!(f, "page limit"),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub dataset_id: String,
    pub mode: SyncMode,
    pub filter: String,
    pub pages_fetched: u32,
    pub processed: u64,
    pub skipped: u64,
    pub stop_reason: StopReason,
    pub previous_watermark: Option<Watermark>,
    /// Watermark in effect after the run
    pub watermark: Option<Watermark>,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn watermark_advanced(&self) -> bool {
        self.watermark != self.previous_watermark
    }
}

/// Drives a single delta sync run over injected collaborators.
///
/// Pages are fetched strictly in order; the watermark is committed only
/// after the sink has been flushed.
pub struct DeltaLoader<'a> {
    fetcher: &'a dyn PageFetcher,
    store: &'a dyn WatermarkStore,
    settings: SyncSettings,
}

impl<'a> DeltaLoader<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        store: &'a dyn WatermarkStore,
        settings: SyncSettings,
    ) -> Self {
        Self {
            fetcher,
            store,
            settings,
        }
    }

    /// Execute one run. `today` anchors the bootstrap window.
    pub async fn run(&self, sink: &mut dyn AlertSink, today: NaiveDate) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id, dataset = %self.settings.dataset_id);
        self.run_inner(sink, today, run_id).instrument(span).await
    }

    async fn run_inner(
        &self,
        sink: &mut dyn AlertSink,
        today: NaiveDate,
        run_id: Uuid,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();

        // Without the IN_PROGRESS marker nothing is ingested
        self.store.mark_in_progress(started_at).await?;

        match self.execute(sink, today, run_id, started_at).await {
            Ok(summary) => {
                info!(
                    processed = summary.processed,
                    skipped = summary.skipped,
                    pages = summary.pages_fetched,
                    stop = %summary.stop_reason,
                    "sync run succeeded"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(error = %e, "sync run failed");
                if let Err(commit_err) = self.store.commit_failure(&e.to_string()).await {
                    warn!(error = %commit_err, "could not record run failure");
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        sink: &mut dyn AlertSink,
        today: NaiveDate,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<RunSummary> {
        let previous = self.store.read().await?;

        let (mode, query) = match &previous {
            Some(wm) => {
                let query = QueryFilter::since(&self.settings.alert_date_field, wm.alert_date);
                info!(watermark = %wm, filter = %query, "delta mode");
                (SyncMode::Delta, query)
            }
            None => {
                let since = today
                    .checked_sub_days(Days::new(self.settings.bootstrap_days as u64))
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "bootstrap window of {} days is out of range",
                            self.settings.bootstrap_days
                        ))
                    })?;
                let query = QueryFilter::since(&self.settings.alert_date_field, since);
                info!(
                    days = self.settings.bootstrap_days,
                    filter = %query,
                    "bootstrap mode"
                );
                (SyncMode::Bootstrap, query)
            }
        };

        let rows = self.settings.rows_per_page;
        let mut filter = DeltaFilter::new(previous.clone())
            .with_order_check(self.settings.verify_sort_order);
        let mut pages_fetched = 0u32;
        let mut processed = 0u64;
        let mut skipped = 0u64;
        let mut stop_reason = StopReason::PageLimit;

        for page_index in 0..self.settings.max_pages {
            let start = page_index.checked_mul(rows).ok_or_else(|| {
                Error::Config(format!("page offset overflow at page {}", page_index))
            })?;

            let page = self.fetcher.fetch_page(&query, rows, start).await?;
            if page.is_empty() {
                stop_reason = StopReason::EndOfData;
                break;
            }
            pages_fetched += 1;

            let fetched = page.len();
            let outcome = filter.screen(page)?;
            let accepted = outcome.accepted.len();
            for record in outcome.accepted {
                sink.upsert(record).await?;
            }
            processed += accepted as u64;
            skipped += outcome.skipped as u64;

            info!(
                page = page_index + 1,
                records = fetched,
                accepted,
                skipped = outcome.skipped,
                "fetched page"
            );

            if outcome.stop_paging {
                stop_reason = StopReason::ReachedWatermark;
                break;
            }
        }

        if stop_reason == StopReason::PageLimit {
            info!(
                max_pages = self.settings.max_pages,
                "page limit reached, remaining records left for the next run"
            );
        }

        sink.flush().await?;

        let candidate = filter.into_candidate();
        let committed = if processed > 0 { candidate } else { None };
        self.store
            .commit_success(committed.as_ref(), processed)
            .await?;

        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        Ok(RunSummary {
            run_id,
            dataset_id: self.settings.dataset_id.clone(),
            mode,
            filter: query.to_string(),
            pages_fetched,
            processed,
            skipped,
            stop_reason,
            watermark: committed.or_else(|| previous.clone()),
            previous_watermark: previous,
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            duration_ms,
        })
    }
}
