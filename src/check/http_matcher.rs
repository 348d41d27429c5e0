use super::{CandidateAlert, ProductInput, SimilarityMatch, SimilarityMatcher};
use crate::config::CheckConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize)]
struct CompareRequest<'a> {
    product: &'a ProductInput,
    candidates: &'a [CandidateAlert],
}

#[derive(Debug, Clone, Deserialize)]
struct CompareResponse {
    #[serde(default)]
    matches: Vec<SimilarityMatch>,
}

/// Matcher delegating comparison to an HTTP backend
pub struct HttpMatcher {
    client: Client,
    base_url: Url,
}

impl HttpMatcher {
    pub fn new(config: &CheckConfig) -> Result<Self> {
        let base_url = Url::parse(&config.matcher_url)
            .map_err(|e| Error::Config(format!("Invalid matcher backend URL: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.matcher_timeout_secs))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid matcher backend URL: {}", e)))
    }
}

#[async_trait]
impl SimilarityMatcher for HttpMatcher {
    async fn compare(
        &self,
        product: &ProductInput,
        candidates: &[CandidateAlert],
    ) -> Result<Vec<SimilarityMatch>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint("/v1/compare")?;
        let response = self
            .client
            .post(url)
            .json(&CompareRequest {
                product,
                candidates,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Matcher(format!(
                "backend returned {}: {}",
                status, body
            )));
        }

        let parsed = response
            .json::<CompareResponse>()
            .await
            .map_err(|e| Error::Matcher(format!("unreadable backend response: {}", e)))?;
        Ok(parsed.matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn matcher_for(server: &MockServer) -> HttpMatcher {
        HttpMatcher::new(&CheckConfig {
            matcher_url: server.uri(),
            ..CheckConfig::default()
        })
        .unwrap()
    }

    fn product() -> ProductInput {
        ProductInput {
            name: "Teddy".to_string(),
            category: "toys".to_string(),
            description: "Plush bear".to_string(),
            brand: Some("Acme".to_string()),
            ..ProductInput::default()
        }
    }

    fn candidates() -> Vec<CandidateAlert> {
        vec![CandidateAlert {
            alert_id: "a1".to_string(),
            alert_date: "2025-09-10".to_string(),
            ingested_at: "2025-09-10T10:00:00+00:00".to_string(),
            fields: Map::new(),
        }]
    }

    #[tokio::test]
    async fn test_posts_product_and_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/compare"))
            .and(body_partial_json(json!({
                "product": {"name": "Teddy", "brand": "Acme"},
                "candidates": [{"alertId": "a1"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "matches": [{
                    "alertId": "a1",
                    "similarity": 72.5,
                    "reason": "same plush bear",
                    "riskAssessment": "choking hazard"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let matches = matcher_for(&server)
            .compare(&product(), &candidates())
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].similarity, 72.5);
        assert_eq!(matches[0].risk_assessment.as_deref(), Some("choking hazard"));
    }

    #[tokio::test]
    async fn test_backend_error_is_matcher_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model offline"))
            .mount(&server)
            .await;

        let err = matcher_for(&server)
            .compare(&product(), &candidates())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Matcher(msg) if msg.contains("model offline")));
    }

    #[tokio::test]
    async fn test_no_candidates_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let matches = matcher_for(&server).compare(&product(), &[]).await.unwrap();
        assert!(matches.is_empty());
    }
}
