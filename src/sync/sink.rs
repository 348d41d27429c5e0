//! Buffered, idempotent alert writes

use super::AlertRecord;
use crate::error::{Error, Result};
use crate::meta::{AlertDocument, MetaDb};
use async_trait::async_trait;
use tracing::debug;

/// Destination for accepted records, keyed by record id
#[async_trait]
pub trait AlertSink: Send {
    /// Queue a record; may write a full batch
    async fn upsert(&mut self, record: AlertRecord) -> Result<()>;

    /// Write everything still buffered
    async fn flush(&mut self) -> Result<()>;
}

/// Sink writing merged documents into the `alerts` table in batches
pub struct SqliteAlertSink {
    db: MetaDb,
    batch_size: usize,
    buffer: Vec<AlertDocument>,
    written: usize,
}

impl SqliteAlertSink {
    pub fn new(db: MetaDb, batch_size: usize) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            written: 0,
        }
    }

    /// Documents written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    async fn write_batch(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.buffer);
        self.db.upsert_alerts(&batch).await.map_err(|e| {
            Error::Sink(format!("batch of {} alerts failed: {}", batch.len(), e))
        })?;
        self.written += batch.len();
        debug!(batch = batch.len(), written = self.written, "wrote alert batch");
        Ok(())
    }
}

#[async_trait]
impl AlertSink for SqliteAlertSink {
    async fn upsert(&mut self, record: AlertRecord) -> Result<()> {
        self.buffer.push(AlertDocument::from_record(&record)?);
        if self.buffer.len() >= self.batch_size {
            self.write_batch().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.write_batch().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::record;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    async fn setup_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("sink.db")).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_writes_full_batches_and_flushes_rest() {
        let (db, _tmp) = setup_db().await;
        let mut sink = SqliteAlertSink::new(db.clone(), 2);

        for id in ["a", "b", "c"] {
            sink.upsert(record(id, "2025-09-10", "T10:00:00Z")).await.unwrap();
        }
        assert_eq!(sink.written(), 2);
        assert_eq!(sink.pending(), 1);
        assert_eq!(db.list_alert_ids().await.unwrap().len(), 2);

        sink.flush().await.unwrap();
        assert_eq!(sink.written(), 3);
        assert_eq!(db.list_alert_ids().await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_repeated_record_is_one_document() {
        let (db, _tmp) = setup_db().await;
        let mut sink = SqliteAlertSink::new(db.clone(), 10);

        let mut full = record("a", "2025-09-10", "T10:00:00Z");
        full.fields.insert("product_brand".to_string(), json!("Acme"));
        sink.upsert(full).await.unwrap();
        sink.flush().await.unwrap();

        // Same record again with a trimmed payload
        sink.upsert(record("a", "2025-09-10", "T10:00:00Z")).await.unwrap();
        sink.flush().await.unwrap();

        assert_eq!(db.list_alert_ids().await.unwrap(), vec!["a"]);
        let stored = db.get_alert("a").await.unwrap().unwrap();
        assert_eq!(stored.field_str("product_brand"), "Acme");
    }

    #[tokio::test]
    async fn test_null_field_survives_repeat_upsert() {
        let (db, _tmp) = setup_db().await;
        let mut sink = SqliteAlertSink::new(db.clone(), 10);

        let mut rec = record("a", "2025-09-10", "T10:00:00Z");
        rec.fields.insert("product_brand".to_string(), Value::Null);

        sink.upsert(rec.clone()).await.unwrap();
        sink.flush().await.unwrap();
        let first = db.get_alert("a").await.unwrap().unwrap().fields().unwrap();

        sink.upsert(rec).await.unwrap();
        sink.flush().await.unwrap();
        let second = db.get_alert("a").await.unwrap().unwrap().fields().unwrap();

        assert_eq!(first.get("product_brand"), Some(&Value::Null));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_merge_replaces_nested_and_nulled_fields() {
        let (db, _tmp) = setup_db().await;
        let mut sink = SqliteAlertSink::new(db.clone(), 10);

        let mut first = record("a", "2025-09-10", "T10:00:00Z");
        first.fields.insert("product_brand".to_string(), json!("Acme"));
        first
            .fields
            .insert("product".to_string(), json!({"model": "X1", "size": "L"}));
        sink.upsert(first).await.unwrap();
        sink.flush().await.unwrap();

        let mut second = record("a", "2025-09-10", "T10:00:00Z");
        second.fields.insert("product_brand".to_string(), Value::Null);
        second
            .fields
            .insert("product".to_string(), json!({"model": "X2"}));
        sink.upsert(second).await.unwrap();
        sink.flush().await.unwrap();

        let fields = db.get_alert("a").await.unwrap().unwrap().fields().unwrap();
        assert_eq!(fields.get("product_brand"), Some(&Value::Null));
        // Nested objects are replaced whole, not merged
        assert_eq!(fields["product"], json!({"model": "X2"}));
        assert_eq!(fields["alert_date"], json!("2025-09-10"));
    }

    #[tokio::test]
    async fn test_write_failure_is_sink_error() {
        let tmp = TempDir::new().unwrap();
        // Schema never created, so the insert fails
        let db = MetaDb::new(&tmp.path().join("empty.db")).await.unwrap();
        let mut sink = SqliteAlertSink::new(db, 10);

        sink.upsert(record("a", "2025-09-10", "T10:00:00Z")).await.unwrap();
        assert!(matches!(sink.flush().await, Err(Error::Sink(_))));
    }
}
