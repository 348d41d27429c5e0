//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::{AlertDocument, AlertStats, DayCount, LoaderState, MetaDb};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Number of alert dates listed with per-day counts
const DAY_COUNT_LIMIT: u32 = 14;

/// Short view of a stored alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSample {
    pub record_id: String,
    pub alert_date: String,
    pub product_category: String,
    pub risk_level: String,
    pub notifying_country: String,
    pub ingested_at: String,
}

impl AlertSample {
    fn from_document(doc: &AlertDocument) -> Self {
        Self {
            record_id: doc.record_id.clone(),
            alert_date: doc.alert_date.clone(),
            product_category: doc.field_str("product_category"),
            risk_level: doc.field_str("risk_level"),
            notifying_country: doc.field_str("notifying_country"),
            ingested_at: doc.ingested_at.clone(),
        }
    }
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub dataset_id: String,
    pub dataset_url: String,
    pub loader_state: Option<LoaderState>,
    pub alert_stats: AlertStats,
    pub alerts_per_day: Vec<DayCount>,
    pub samples: Vec<AlertSample>,
}

/// Get loader and data status
pub async fn cmd_status(config: &Config, db: &MetaDb, sample: u32) -> Result<StatusInfo> {
    info!("Getting status");

    let loader_state = db.get_loader_state(&config.dataset.id).await?;
    let alert_stats = db.get_alert_stats().await?;
    let alerts_per_day = db.alerts_per_day(DAY_COUNT_LIMIT).await?;
    let samples = db
        .latest_alerts(sample)
        .await?
        .iter()
        .map(AlertSample::from_document)
        .collect();

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        dataset_id: config.dataset.id.clone(),
        dataset_url: config.dataset.base_url.clone(),
        loader_state,
        alert_stats,
        alerts_per_day,
        samples,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 safegate Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Dataset: {} ({})", status.dataset_id, status.dataset_url);

    println!("\nLoader:");
    match &status.loader_state {
        Some(state) => {
            println!(
                "  Last status: {}",
                state.last_run_status.as_deref().unwrap_or("-")
            );
            println!(
                "  Last run: {} → {}",
                state.last_run_start.as_deref().unwrap_or("-"),
                state.last_run_end.as_deref().unwrap_or("-")
            );
            match (&state.last_alert_date, &state.last_record_timestamp) {
                (Some(date), Some(ts)) => println!("  Watermark: {} @ {}", date, ts),
                _ => println!("  Watermark: none (next run bootstraps)"),
            }
            if let Some(processed) = state.last_run_processed_records {
                println!("  Processed in last success: {}", processed);
            }
            if let Some(err) = &state.last_error {
                println!("  Last error: {}", err);
            }
        }
        None => println!("  Never run. Use 'safegate sync' to load alerts."),
    }

    println!("\nAlerts:");
    println!("  Total: {}", status.alert_stats.total_alerts);
    if let (Some(newest), Some(oldest)) = (
        &status.alert_stats.newest_alert_date,
        &status.alert_stats.oldest_alert_date,
    ) {
        println!("  Range: {} .. {}", oldest, newest);
    }

    if !status.alerts_per_day.is_empty() {
        println!("\nPer day:");
        for day in &status.alerts_per_day {
            println!("  {}: {}", day.alert_date, day.count);
        }
    }

    if !status.samples.is_empty() {
        println!("\nLatest alerts:");
        for sample in &status.samples {
            println!(
                "• {} [{}] {} ({}, {})",
                sample.record_id,
                sample.alert_date,
                sample.product_category,
                sample.risk_level,
                sample.notifying_country
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::record;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_reports_state_and_samples() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        let db = MetaDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();

        let empty = cmd_status(&config, &db, 5).await.unwrap();
        assert!(empty.loader_state.is_none());
        assert_eq!(empty.alert_stats.total_alerts, 0);

        let mut newest = record("b", "2025-09-10", "T1");
        newest
            .fields
            .insert("risk_level".to_string(), json!("serious"));
        let docs = vec![
            AlertDocument::from_record(&record("a", "2025-09-09", "T1")).unwrap(),
            AlertDocument::from_record(&newest).unwrap(),
            AlertDocument::from_record(&record("c", "2025-09-10", "T0")).unwrap(),
        ];
        db.upsert_alerts(&docs).await.unwrap();
        db.mark_run_started(&config.dataset.id, "2025-09-12T03:13:00+00:00")
            .await
            .unwrap();

        let status = cmd_status(&config, &db, 1).await.unwrap();
        assert_eq!(status.alert_stats.total_alerts, 3);
        assert_eq!(status.alerts_per_day.len(), 2);
        assert_eq!(status.alerts_per_day[0].alert_date, "2025-09-10");
        assert_eq!(status.alerts_per_day[0].count, 2);
        assert_eq!(status.samples.len(), 1);
        assert_eq!(status.samples[0].record_id, "b");
        assert_eq!(status.samples[0].risk_level, "serious");
        assert_eq!(
            status.loader_state.unwrap().last_run_status.as_deref(),
            Some("IN_PROGRESS")
        );
    }
}
