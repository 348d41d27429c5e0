//! SQLite schema definition

/// SQL schema for the safegate database
pub const SCHEMA_SQL: &str = r#"
-- Loader state: one row per dataset, holds the watermark and last run status
CREATE TABLE IF NOT EXISTS loader_state (
    dataset_id TEXT PRIMARY KEY,
    last_alert_date TEXT,
    last_record_timestamp TEXT,
    last_run_start TEXT,
    last_run_end TEXT,
    last_run_status TEXT,
    last_run_processed_records INTEGER,
    last_error TEXT
);

-- Alerts: one document per upstream record, merged on re-ingest
CREATE TABLE IF NOT EXISTS alerts (
    record_id TEXT PRIMARY KEY,
    dataset_id TEXT NOT NULL,
    alert_date TEXT NOT NULL,
    record_timestamp TEXT NOT NULL,
    fields_json TEXT NOT NULL DEFAULT '{}',
    first_ingested_at TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_alert_date ON alerts(alert_date DESC, record_timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_alerts_dataset ON alerts(dataset_id);
"#;
