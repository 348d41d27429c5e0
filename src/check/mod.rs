//! Product safety checks against recently ingested alerts

mod http_matcher;

pub use http_matcher::*;

use crate::config::CheckConfig;
use crate::error::{Error, Result};
use crate::meta::{AlertDocument, MetaDb};
use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub const NO_ALERTS_RECOMMENDATION: &str =
    "No recent Safety Gate alerts found. Product appears safe based on available data.";
pub const SAFE_RECOMMENDATION: &str =
    "Product appears safe based on Safety Gate database analysis. No significant matches found.";
pub const HIGH_RISK_RECOMMENDATION: &str = "HIGH RISK: Found serious safety alerts for similar products. \
     Recommend avoiding purchase and consulting authorities.";
pub const CAUTION_RECOMMENDATION: &str =
    "CAUTION: Found alerts for similar products. Review safety concerns before purchase.";

/// Product submitted for a safety check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ProductInput {
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("name", &self.name),
            ("category", &self.category),
            ("description", &self.description),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Recent alert offered to the matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAlert {
    pub alert_id: String,
    pub alert_date: String,
    pub ingested_at: String,
    pub fields: Map<String, Value>,
}

impl CandidateAlert {
    pub fn from_document(doc: &AlertDocument) -> Result<Self> {
        Ok(Self {
            alert_id: doc.record_id.clone(),
            alert_date: doc.alert_date.clone(),
            ingested_at: doc.ingested_at.clone(),
            fields: doc.fields()?,
        })
    }

    pub fn risk_level(&self) -> Option<&str> {
        self.fields
            .get("risk_level")
            .and_then(Value::as_str)
            .filter(|level| !level.is_empty())
    }
}

/// One similarity judgement from the matcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityMatch {
    pub alert_id: String,
    /// 0 to 100, where 100 is identical
    pub similarity: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<String>,
}

/// Compares a product with candidate alerts
#[async_trait]
pub trait SimilarityMatcher: Send + Sync {
    async fn compare(
        &self,
        product: &ProductInput,
        candidates: &[CandidateAlert],
    ) -> Result<Vec<SimilarityMatch>>;
}

pub fn create_matcher(config: &CheckConfig) -> Result<Arc<dyn SimilarityMatcher>> {
    if config.matcher_url.trim().is_empty() {
        return Err(Error::Config(
            "No similarity matcher configured (set check.matcher_url or SAFEGATE_MATCHER_URL)"
                .to_string(),
        ));
    }
    Ok(Arc::new(HttpMatcher::new(config)?))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyWarning {
    pub alert_id: String,
    pub similarity: f64,
    pub risk_level: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_assessment: Option<String>,
    /// `None` when the matcher named an alert outside the candidate set
    pub alert_details: Option<CandidateAlert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyCheckResult {
    pub is_safe: bool,
    pub warnings: Vec<SafetyWarning>,
    pub recommendation: String,
    pub checked_at: String,
}

/// Runs safety checks over the local alert store
#[derive(Clone)]
pub struct SafetyChecker {
    db: MetaDb,
    matcher: Option<Arc<dyn SimilarityMatcher>>,
    settings: CheckConfig,
}

impl SafetyChecker {
    pub fn new(db: MetaDb, matcher: Option<Arc<dyn SimilarityMatcher>>, settings: CheckConfig) -> Self {
        Self {
            db,
            matcher,
            settings,
        }
    }

    /// Alerts from the lookback window ending at `today`, newest first
    pub async fn candidates(&self, today: NaiveDate) -> Result<Vec<CandidateAlert>> {
        let since = today
            .checked_sub_days(Days::new(self.settings.lookback_days as u64))
            .unwrap_or(NaiveDate::MIN);
        let docs = self
            .db
            .recent_alerts(since, self.settings.candidate_limit)
            .await?;
        docs.iter().map(CandidateAlert::from_document).collect()
    }

    pub async fn check(&self, product: &ProductInput, today: NaiveDate) -> Result<SafetyCheckResult> {
        product.validate()?;
        info!(product = %product.name, "checking product safety");

        let candidates = self.candidates(today).await?;
        info!(candidates = candidates.len(), "loaded recent alerts");

        if candidates.is_empty() {
            return Ok(SafetyCheckResult {
                is_safe: true,
                warnings: Vec::new(),
                recommendation: NO_ALERTS_RECOMMENDATION.to_string(),
                checked_at: Utc::now().to_rfc3339(),
            });
        }

        let matcher = self
            .matcher
            .as_ref()
            .ok_or_else(|| Error::Matcher("no similarity matcher configured".to_string()))?;
        let matches = matcher.compare(product, &candidates).await?;
        debug!(matches = matches.len(), "matcher returned");

        Ok(evaluate(matches, &candidates, self.settings.min_similarity))
    }
}

/// Turn raw matches into a verdict
pub fn evaluate(
    matches: Vec<SimilarityMatch>,
    candidates: &[CandidateAlert],
    min_similarity: f64,
) -> SafetyCheckResult {
    let warnings: Vec<SafetyWarning> = matches
        .into_iter()
        .filter(|m| m.similarity > min_similarity)
        .map(|m| {
            let details = candidates.iter().find(|c| c.alert_id == m.alert_id).cloned();
            let risk_level = details
                .as_ref()
                .and_then(CandidateAlert::risk_level)
                .unwrap_or("unknown")
                .to_string();
            let reason = if m.reason.trim().is_empty() {
                "Potential similarity detected".to_string()
            } else {
                m.reason
            };
            SafetyWarning {
                alert_id: m.alert_id,
                similarity: m.similarity,
                risk_level,
                reason,
                risk_assessment: m.risk_assessment,
                alert_details: details,
            }
        })
        .collect();

    let recommendation = if warnings.is_empty() {
        SAFE_RECOMMENDATION
    } else if warnings
        .iter()
        .any(|w| matches!(w.risk_level.as_str(), "serious" | "high"))
    {
        HIGH_RISK_RECOMMENDATION
    } else {
        CAUTION_RECOMMENDATION
    };

    SafetyCheckResult {
        is_safe: warnings.is_empty(),
        warnings,
        recommendation: recommendation.to_string(),
        checked_at: Utc::now().to_rfc3339(),
    }
}
