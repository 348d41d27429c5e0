//! Persisted sync cursor and run status

use super::Watermark;
use crate::error::Result;
use crate::meta::MetaDb;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Cursor and run-status persistence for one dataset
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Current watermark; `None` means bootstrap mode
    async fn read(&self) -> Result<Option<Watermark>>;

    async fn mark_in_progress(&self, started_at: DateTime<Utc>) -> Result<()>;

    /// Mark SUCCESS. The stored watermark only moves when `processed > 0`
    /// and a watermark is given.
    async fn commit_success(&self, watermark: Option<&Watermark>, processed: u64) -> Result<()>;

    /// Mark FAILURE, leaving the watermark as it was
    async fn commit_failure(&self, message: &str) -> Result<()>;
}

/// Watermark store backed by the `loader_state` table
#[derive(Clone)]
pub struct SqliteWatermarkStore {
    db: MetaDb,
    dataset_id: String,
}

impl SqliteWatermarkStore {
    pub fn new(db: MetaDb, dataset_id: impl Into<String>) -> Self {
        Self {
            db,
            dataset_id: dataset_id.into(),
        }
    }
}

#[async_trait]
impl WatermarkStore for SqliteWatermarkStore {
    async fn read(&self) -> Result<Option<Watermark>> {
        match self.db.get_loader_state(&self.dataset_id).await? {
            Some(state) => state.watermark(),
            None => Ok(None),
        }
    }

    async fn mark_in_progress(&self, started_at: DateTime<Utc>) -> Result<()> {
        self.db
            .mark_run_started(&self.dataset_id, &started_at.to_rfc3339())
            .await
    }

    async fn commit_success(&self, watermark: Option<&Watermark>, processed: u64) -> Result<()> {
        let watermark = if processed > 0 { watermark } else { None };
        self.db
            .mark_run_succeeded(&self.dataset_id, watermark, processed)
            .await
    }

    async fn commit_failure(&self, message: &str) -> Result<()> {
        self.db.mark_run_failed(&self.dataset_id, message).await
    }
}
