//! Incremental Safety Gate synchronization
//!
//! A run reads the persisted watermark, pages through the upstream dataset
//! newest-first, keeps only records newer than the watermark, upserts them
//! and finally advances the watermark:
//! - [`WatermarkStore`] persists the cursor and run status
//! - [`PageFetcher`] retrieves pages from the upstream API
//! - [`DeltaFilter`] decides accept / skip / stop per record
//! - [`AlertSink`] writes accepted records, merged by record id
//! - [`DeltaLoader`] drives one run end to end

mod delta;
mod fetcher;
mod loader;
mod sink;
mod watermark;

#[cfg(test)]
pub(crate) mod testing;

pub use delta::*;
pub use fetcher::*;
pub use loader::*;
pub use sink::*;
pub use watermark::*;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Position of the newest record already ingested.
///
/// Ordering is lexicographic over `(alert_date, record_timestamp)`, with the
/// timestamp compared as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Watermark {
    pub alert_date: NaiveDate,
    pub record_timestamp: String,
}

impl Watermark {
    pub fn new(alert_date: NaiveDate, record_timestamp: impl Into<String>) -> Self {
        Self {
            alert_date,
            record_timestamp: record_timestamp.into(),
        }
    }

    /// Watermark position of a record
    pub fn of(record: &AlertRecord) -> Self {
        Self::new(record.alert_date, record.record_timestamp.clone())
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.alert_date, self.record_timestamp)
    }
}

/// A recall alert as published upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub dataset_id: String,
    pub record_id: String,
    pub alert_date: NaiveDate,
    pub record_timestamp: String,
    pub fields: Map<String, Value>,
}

/// Raw record envelope returned by the records API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub datasetid: Option<String>,
    #[serde(default)]
    pub recordid: Option<String>,
    #[serde(default)]
    pub fields: Option<Map<String, Value>>,
    #[serde(default)]
    pub record_timestamp: Option<String>,
}

impl AlertRecord {
    /// Validate a raw upstream record.
    ///
    /// The id and both ordering keys must be present; anything less cannot be
    /// placed relative to the watermark and is rejected.
    pub fn from_raw(raw: RawRecord, alert_date_field: &str, dataset_id: &str) -> crate::Result<Self> {
        let record_id = raw
            .recordid
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| crate::Error::MalformedRecord("record without recordid".to_string()))?;

        let fields = raw.fields.unwrap_or_default();

        let alert_date = match fields.get(alert_date_field) {
            Some(Value::String(s)) => parse_alert_date(s).ok_or_else(|| {
                crate::Error::MalformedRecord(format!(
                    "record {}: unparseable {} '{}'",
                    record_id, alert_date_field, s
                ))
            })?,
            _ => {
                return Err(crate::Error::MalformedRecord(format!(
                    "record {}: missing {}",
                    record_id, alert_date_field
                )))
            }
        };

        let record_timestamp = raw
            .record_timestamp
            .filter(|ts| !ts.trim().is_empty())
            .ok_or_else(|| {
                crate::Error::MalformedRecord(format!(
                    "record {}: missing record_timestamp",
                    record_id
                ))
            })?;

        Ok(Self {
            dataset_id: raw.datasetid.unwrap_or_else(|| dataset_id.to_string()),
            record_id,
            alert_date,
            record_timestamp,
            fields,
        })
    }
}

/// Parse `YYYY-MM-DD`, tolerating a full RFC 3339 timestamp
pub fn parse_alert_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Day-granular lower bound sent upstream as the `q` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    pub field: String,
    pub since: NaiveDate,
}

impl QueryFilter {
    pub fn since(field: impl Into<String>, since: NaiveDate) -> Self {
        Self {
            field: field.into(),
            since,
        }
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} >= '{}'", self.field, self.since.format("%Y-%m-%d"))
    }
}
