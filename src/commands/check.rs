//! Check command implementation

use crate::check::{create_matcher, ProductInput, SafetyCheckResult, SafetyChecker};
use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use chrono::Utc;
use tracing::warn;

/// Check one product against recent alerts
pub async fn cmd_check(config: &Config, db: &MetaDb, product: ProductInput) -> Result<SafetyCheckResult> {
    product.validate()?;

    // A missing matcher only matters once there are candidates to compare
    let matcher = match create_matcher(&config.check) {
        Ok(matcher) => Some(matcher),
        Err(e) => {
            warn!("{}", e);
            None
        }
    };

    SafetyChecker::new(db.clone(), matcher, config.check.clone())
        .check(&product, Utc::now().date_naive())
        .await
}

/// Print a safety check result to console
pub fn print_check_result(product: &str, result: &SafetyCheckResult) {
    let verdict = if result.is_safe { "✓ No matches" } else { "⚠ Matches found" };
    println!("\n🔎 Safety check: {}\n", product);
    println!("{}", verdict);
    println!("{}", result.recommendation);

    if !result.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &result.warnings {
            println!(
                "• {} (similarity {:.0}, risk {})",
                warning.alert_id, warning.similarity, warning.risk_level
            );
            println!("  {}", warning.reason);
            if let Some(assessment) = &warning.risk_assessment {
                println!("  Assessment: {}", assessment);
            }
        }
    }
    println!("\nChecked at: {}", result.checked_at);
}
