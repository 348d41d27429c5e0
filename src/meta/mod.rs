//! Local document store using SQLite
//!
//! This module handles all persisted state:
//! - Loader state (watermark and last run status per dataset)
//! - Alerts (one merged document per upstream record)

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::sync::{parse_alert_date, AlertRecord, Watermark};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Loader run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    InProgress,
    Success,
    Failure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::InProgress => write!(f, "IN_PROGRESS"),
            RunStatus::Success => write!(f, "SUCCESS"),
            RunStatus::Failure => write!(f, "FAILURE"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "IN_PROGRESS" => Ok(RunStatus::InProgress),
            "SUCCESS" => Ok(RunStatus::Success),
            "FAILURE" => Ok(RunStatus::Failure),
            _ => Err(Error::State(format!("Unknown run status: {}", s))),
        }
    }
}

/// Persisted loader state for one dataset
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LoaderState {
    pub dataset_id: String,
    pub last_alert_date: Option<String>,
    pub last_record_timestamp: Option<String>,
    pub last_run_start: Option<String>,
    pub last_run_end: Option<String>,
    pub last_run_status: Option<String>,
    pub last_run_processed_records: Option<i64>,
    pub last_error: Option<String>,
}

impl LoaderState {
    pub fn status(&self) -> Result<Option<RunStatus>> {
        self.last_run_status
            .as_deref()
            .map(str::parse::<RunStatus>)
            .transpose()
    }

    /// The stored watermark, if both halves are present
    pub fn watermark(&self) -> Result<Option<Watermark>> {
        match (&self.last_alert_date, &self.last_record_timestamp) {
            (Some(date), Some(ts)) => {
                let alert_date = parse_alert_date(date).ok_or_else(|| {
                    Error::State(format!(
                        "Stored last_alert_date '{}' for {} is not a date",
                        date, self.dataset_id
                    ))
                })?;
                Ok(Some(Watermark::new(alert_date, ts.clone())))
            }
            (None, None) => Ok(None),
            _ => {
                warn!(
                    dataset = %self.dataset_id,
                    "incomplete watermark in loader state, treating as absent"
                );
                Ok(None)
            }
        }
    }
}

/// A stored alert document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AlertDocument {
    pub record_id: String,
    pub dataset_id: String,
    pub alert_date: String,
    pub record_timestamp: String,
    pub fields_json: String,
    pub first_ingested_at: String,
    pub ingested_at: String,
}

impl AlertDocument {
    pub fn from_record(record: &AlertRecord) -> Result<Self> {
        let now = Utc::now().to_rfc3339();
        Ok(Self {
            record_id: record.record_id.clone(),
            dataset_id: record.dataset_id.clone(),
            alert_date: record.alert_date.format("%Y-%m-%d").to_string(),
            record_timestamp: record.record_timestamp.clone(),
            fields_json: serde_json::to_string(&record.fields)?,
            first_ingested_at: now.clone(),
            ingested_at: now,
        })
    }

    pub fn fields(&self) -> Result<Map<String, Value>> {
        Ok(serde_json::from_str(&self.fields_json)?)
    }

    /// String value of a field, empty when absent
    pub fn field_str(&self, name: &str) -> String {
        self.fields()
            .ok()
            .and_then(|fields| fields.get(name).cloned())
            .map(|value| match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    }
}

/// Alert count for one alert date
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DayCount {
    pub alert_date: String,
    pub count: i64,
}

/// Store-wide alert statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertStats {
    pub total_alerts: usize,
    pub newest_alert_date: Option<String>,
    pub oldest_alert_date: Option<String>,
}

/// Database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Create database with path directly (without full config)
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='loader_state'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== Loader State Operations =====

    /// Get the loader state of a dataset
    pub async fn get_loader_state(&self, dataset_id: &str) -> Result<Option<LoaderState>> {
        let state =
            sqlx::query_as::<_, LoaderState>("SELECT * FROM loader_state WHERE dataset_id = ?")
                .bind(dataset_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(state)
    }

    /// Record the start of a run
    pub async fn mark_run_started(&self, dataset_id: &str, started_at: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loader_state (dataset_id, last_run_start, last_run_status)
            VALUES (?, ?, ?)
            ON CONFLICT(dataset_id) DO UPDATE SET
                last_run_start = excluded.last_run_start,
                last_run_status = excluded.last_run_status
            "#,
        )
        .bind(dataset_id)
        .bind(started_at)
        .bind(RunStatus::InProgress.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a successful run; the watermark is only replaced when given
    pub async fn mark_run_succeeded(
        &self,
        dataset_id: &str,
        watermark: Option<&Watermark>,
        processed: u64,
    ) -> Result<()> {
        let alert_date = watermark.map(|wm| wm.alert_date.format("%Y-%m-%d").to_string());
        let record_timestamp = watermark.map(|wm| wm.record_timestamp.clone());
        sqlx::query(
            r#"
            INSERT INTO loader_state (
                dataset_id, last_alert_date, last_record_timestamp,
                last_run_end, last_run_status, last_run_processed_records, last_error
            )
            VALUES (?, ?, ?, ?, ?, ?, NULL)
            ON CONFLICT(dataset_id) DO UPDATE SET
                last_alert_date = COALESCE(excluded.last_alert_date, loader_state.last_alert_date),
                last_record_timestamp = COALESCE(excluded.last_record_timestamp, loader_state.last_record_timestamp),
                last_run_end = excluded.last_run_end,
                last_run_status = excluded.last_run_status,
                last_run_processed_records = excluded.last_run_processed_records,
                last_error = NULL
            "#,
        )
        .bind(dataset_id)
        .bind(alert_date)
        .bind(record_timestamp)
        .bind(Utc::now().to_rfc3339())
        .bind(RunStatus::Success.to_string())
        .bind(processed as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed run, leaving the watermark untouched
    pub async fn mark_run_failed(&self, dataset_id: &str, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loader_state (dataset_id, last_run_end, last_run_status, last_error)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(dataset_id) DO UPDATE SET
                last_run_end = excluded.last_run_end,
                last_run_status = excluded.last_run_status,
                last_error = excluded.last_error
            "#,
        )
        .bind(dataset_id)
        .bind(Utc::now().to_rfc3339())
        .bind(RunStatus::Failure.to_string())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ===== Alert Operations =====

    /// Upsert a batch of alerts in one transaction.
    ///
    /// Existing documents are merged key by key at the top level of `fields`:
    /// incoming keys overwrite (nulls included), stored keys absent from the
    /// new payload are kept, and `first_ingested_at` never changes.
    pub async fn upsert_alerts(&self, docs: &[AlertDocument]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for doc in docs {
            let stored: Option<String> =
                sqlx::query_scalar("SELECT fields_json FROM alerts WHERE record_id = ?")
                    .bind(&doc.record_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            let fields_json = match stored {
                Some(stored) => merge_fields(&stored, &doc.fields_json)?,
                None => doc.fields_json.clone(),
            };

            sqlx::query(
                r#"
                INSERT INTO alerts (
                    record_id, dataset_id, alert_date, record_timestamp,
                    fields_json, first_ingested_at, ingested_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(record_id) DO UPDATE SET
                    dataset_id = excluded.dataset_id,
                    alert_date = excluded.alert_date,
                    record_timestamp = excluded.record_timestamp,
                    fields_json = excluded.fields_json,
                    ingested_at = excluded.ingested_at
                "#,
            )
            .bind(&doc.record_id)
            .bind(&doc.dataset_id)
            .bind(&doc.alert_date)
            .bind(&doc.record_timestamp)
            .bind(&fields_json)
            .bind(&doc.first_ingested_at)
            .bind(&doc.ingested_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Get an alert by record id
    pub async fn get_alert(&self, record_id: &str) -> Result<Option<AlertDocument>> {
        let doc = sqlx::query_as::<_, AlertDocument>("SELECT * FROM alerts WHERE record_id = ?")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// Alerts dated on or after `since`, newest first
    pub async fn recent_alerts(&self, since: NaiveDate, limit: u32) -> Result<Vec<AlertDocument>> {
        let docs = sqlx::query_as::<_, AlertDocument>(
            r#"
            SELECT * FROM alerts
            WHERE alert_date >= ?
            ORDER BY alert_date DESC, record_timestamp DESC
            LIMIT ?
            "#,
        )
        .bind(since.format("%Y-%m-%d").to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// Newest alerts regardless of date
    pub async fn latest_alerts(&self, limit: u32) -> Result<Vec<AlertDocument>> {
        let docs = sqlx::query_as::<_, AlertDocument>(
            "SELECT * FROM alerts ORDER BY alert_date DESC, record_timestamp DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// List all record ids (sorted)
    pub async fn list_alert_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT record_id FROM alerts ORDER BY record_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(ids)
    }

    // ===== Statistics =====

    /// Get alert statistics
    pub async fn get_alert_stats(&self) -> Result<AlertStats> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM alerts")
            .fetch_one(&self.pool)
            .await?;

        let (newest, oldest): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT MAX(alert_date), MIN(alert_date) FROM alerts")
                .fetch_one(&self.pool)
                .await?;

        Ok(AlertStats {
            total_alerts: total as usize,
            newest_alert_date: newest,
            oldest_alert_date: oldest,
        })
    }

    /// Alert counts for the most recent alert dates
    pub async fn alerts_per_day(&self, days: u32) -> Result<Vec<DayCount>> {
        let counts = sqlx::query_as::<_, DayCount>(
            r#"
            SELECT alert_date, COUNT(*) AS count FROM alerts
            GROUP BY alert_date
            ORDER BY alert_date DESC
            LIMIT ?
            "#,
        )
        .bind(days as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(counts)
    }
}

/// Shallow merge of two JSON objects; `incoming` wins on shared keys
fn merge_fields(stored: &str, incoming: &str) -> Result<String> {
    let mut merged: Map<String, Value> = serde_json::from_str(stored)?;
    let incoming: Map<String, Value> = serde_json::from_str(incoming)?;
    merged.extend(incoming);
    Ok(serde_json::to_string(&merged)?)
}
