//! In-memory doubles for the sync traits

use super::{AlertRecord, AlertSink, PageFetcher, QueryFilter, Watermark, WatermarkStore};
use crate::error::{Error, Result};
use crate::meta::RunStatus;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Map};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub fn record(id: &str, alert_date: &str, record_timestamp: &str) -> AlertRecord {
    let mut fields = Map::new();
    fields.insert("alert_date".to_string(), json!(alert_date));
    AlertRecord {
        dataset_id: "test-dataset".to_string(),
        record_id: id.to_string(),
        alert_date: NaiveDate::parse_from_str(alert_date, "%Y-%m-%d").unwrap(),
        record_timestamp: record_timestamp.to_string(),
        fields,
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub watermark: Option<Watermark>,
    pub status: Option<RunStatus>,
    pub run_start: Option<DateTime<Utc>>,
    pub run_end: Option<DateTime<Utc>>,
    pub processed: Option<u64>,
    pub last_error: Option<String>,
    /// Every status written, in order
    pub transitions: Vec<RunStatus>,
}

#[derive(Clone, Default)]
pub struct MemoryWatermarkStore {
    pub state: Arc<Mutex<MemoryState>>,
    pub fail_mark_in_progress: bool,
    pub fail_commit_success: bool,
}

impl MemoryWatermarkStore {
    pub fn with_watermark(watermark: Watermark) -> Self {
        let store = Self::default();
        store.state.lock().unwrap().watermark = Some(watermark);
        store
    }

    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().unwrap().clone()
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn read(&self) -> Result<Option<Watermark>> {
        Ok(self.state.lock().unwrap().watermark.clone())
    }

    async fn mark_in_progress(&self, started_at: DateTime<Utc>) -> Result<()> {
        if self.fail_mark_in_progress {
            return Err(Error::State("state store unavailable".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.run_start = Some(started_at);
        state.status = Some(RunStatus::InProgress);
        state.transitions.push(RunStatus::InProgress);
        Ok(())
    }

    async fn commit_success(&self, watermark: Option<&Watermark>, processed: u64) -> Result<()> {
        if self.fail_commit_success {
            return Err(Error::State("commit rejected".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        if processed > 0 {
            if let Some(wm) = watermark {
                state.watermark = Some(wm.clone());
            }
        }
        state.processed = Some(processed);
        state.run_end = Some(Utc::now());
        state.status = Some(RunStatus::Success);
        state.transitions.push(RunStatus::Success);
        Ok(())
    }

    async fn commit_failure(&self, message: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.run_end = Some(Utc::now());
        state.status = Some(RunStatus::Failure);
        state.last_error = Some(message.to_string());
        state.transitions.push(RunStatus::Failure);
        Ok(())
    }
}

/// Sink merging fields per record id, like the SQLite sink
#[derive(Clone, Default)]
pub struct MemorySink {
    pub documents: Arc<Mutex<BTreeMap<String, AlertRecord>>>,
    pub pending: Vec<AlertRecord>,
    pub flushes: usize,
    pub fail_flush: bool,
}

impl MemorySink {
    pub fn ids(&self) -> Vec<String> {
        self.documents.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl AlertSink for MemorySink {
    async fn upsert(&mut self, record: AlertRecord) -> Result<()> {
        self.pending.push(record);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.fail_flush {
            return Err(Error::Sink("disk full".to_string()));
        }
        let mut docs = self.documents.lock().unwrap();
        for record in self.pending.drain(..) {
            match docs.get_mut(&record.record_id) {
                Some(existing) => {
                    for (key, value) in record.fields {
                        existing.fields.insert(key, value);
                    }
                    existing.alert_date = record.alert_date;
                    existing.record_timestamp = record.record_timestamp;
                }
                None => {
                    docs.insert(record.record_id.clone(), record);
                }
            }
        }
        self.flushes += 1;
        Ok(())
    }
}

/// Serves a fixed newest-first record list by offset and logs each request.
/// The `q` filter is recorded but not applied, so stale records still reach
/// the delta filter.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    pub records: Vec<AlertRecord>,
    pub requests: Arc<Mutex<Vec<(String, u32, u32)>>>,
    /// Fail when asked for this page offset
    pub fail_at_start: Option<u32>,
}

impl ScriptedFetcher {
    pub fn new(records: Vec<AlertRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(
        &self,
        filter: &QueryFilter,
        rows: u32,
        start: u32,
    ) -> Result<Vec<AlertRecord>> {
        self.requests
            .lock()
            .unwrap()
            .push((filter.to_string(), rows, start));

        if self.fail_at_start == Some(start) {
            return Err(Error::Upstream("dataset API returned 503".to_string()));
        }

        Ok(self
            .records
            .iter()
            .skip(start as usize)
            .take(rows as usize)
            .cloned()
            .collect())
    }
}

/// `count` records, one per timestamp, newest first, all on `alert_date`
pub fn same_day_records(alert_date: &str, count: usize) -> Vec<AlertRecord> {
    (0..count)
        .rev()
        .map(|i| record(&format!("r{:04}", i), alert_date, &format!("T{:06}", i)))
        .collect()
}
