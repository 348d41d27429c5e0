//! Paginated reads from the Opendatasoft records API

use super::{AlertRecord, QueryFilter, RawRecord};
use crate::config::{DatasetConfig, HttpConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Source of newest-first pages of alert records
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `rows` records starting at offset `start`. An empty result
    /// means there is nothing more for this filter.
    async fn fetch_page(&self, filter: &QueryFilter, rows: u32, start: u32)
        -> Result<Vec<AlertRecord>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    records: Vec<RawRecord>,
}

/// Records API client for one dataset
pub struct OdsFetcher {
    client: Client,
    base_url: Url,
    dataset: DatasetConfig,
    api_key: Option<String>,
    retries: u32,
}

impl OdsFetcher {
    pub fn new(dataset: &DatasetConfig, http: &HttpConfig) -> Result<Self> {
        let base_url = Url::parse(&dataset.base_url)
            .map_err(|e| Error::Config(format!("Invalid dataset base URL: {}", e)))?;

        let client = Client::builder()
            .user_agent(&http.user_agent)
            .timeout(Duration::from_secs(http.timeout_secs))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            base_url,
            dataset: dataset.clone(),
            api_key: dataset.api_key(),
            retries: http.retries,
        })
    }

    fn query_params(&self, filter: &QueryFilter, rows: u32, start: u32) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("dataset", self.dataset.id.clone()),
            ("rows", rows.to_string()),
            ("start", start.to_string()),
            ("sort", self.dataset.sort_expression()),
            ("q", filter.to_string()),
        ];
        for facet in &self.dataset.facets {
            params.push(("facet", facet.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("apikey", key.clone()));
        }
        params
    }

    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> Result<SearchResponse> {
        let mut last_err: Option<Error> = None;
        for attempt in 0..=self.retries {
            let req = request
                .try_clone()
                .ok_or_else(|| Error::Upstream("Failed to clone dataset request".to_string()))?;

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.json::<SearchResponse>().await?);
                    }
                    let body = response.text().await.unwrap_or_default();
                    let err = Error::Upstream(format!(
                        "dataset API returned {}: {}",
                        status,
                        truncate(&body, 200)
                    ));
                    if !is_transient(status) {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => last_err = Some(Error::Http(e)),
            }

            if attempt < self.retries {
                warn!(
                    attempt = attempt + 1,
                    retries = self.retries,
                    "transient dataset API failure, retrying"
                );
                tokio::time::sleep(Duration::from_millis(200 * (attempt + 1) as u64)).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::Upstream("Dataset API request failed".to_string())))
    }
}

#[async_trait]
impl PageFetcher for OdsFetcher {
    async fn fetch_page(
        &self,
        filter: &QueryFilter,
        rows: u32,
        start: u32,
    ) -> Result<Vec<AlertRecord>> {
        let request = self
            .client
            .get(self.base_url.clone())
            .query(&self.query_params(filter, rows, start));

        debug!(dataset = %self.dataset.id, %filter, rows, start, "fetching page");
        let response = self.send_with_retry(request).await?;

        response
            .records
            .into_iter()
            .map(|raw| AlertRecord::from_raw(raw, &self.dataset.alert_date_field, &self.dataset.id))
            .collect()
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer, retries: u32) -> OdsFetcher {
        let dataset = DatasetConfig {
            base_url: format!("{}/api/records/1.0/search", server.uri()),
            ..DatasetConfig::default()
        };
        let http = HttpConfig {
            retries,
            ..HttpConfig::default()
        };
        OdsFetcher::new(&dataset, &http).unwrap()
    }

    fn filter() -> QueryFilter {
        QueryFilter::since("alert_date", NaiveDate::from_ymd_opt(2025, 9, 5).unwrap())
    }

    fn body(ids: &[&str]) -> serde_json::Value {
        let records: Vec<_> = ids
            .iter()
            .map(|id| {
                json!({
                    "datasetid": "healthref-europe-rapex-en",
                    "recordid": id,
                    "fields": {"alert_date": "2025-09-10", "risk_level": "serious"},
                    "record_timestamp": "2025-09-10T08:00:00+00:00"
                })
            })
            .collect();
        json!({"nhits": ids.len(), "records": records})
    }

    #[tokio::test]
    async fn test_sends_paging_and_sort_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/records/1.0/search"))
            .and(query_param("dataset", "healthref-europe-rapex-en"))
            .and(query_param("rows", "50"))
            .and(query_param("start", "100"))
            .and(query_param("sort", "-alert_date,-record_timestamp"))
            .and(query_param("q", "alert_date >= '2025-09-05'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(&["a", "b"])))
            .expect(1)
            .mount(&server)
            .await;

        let records = fetcher_for(&server, 0)
            .fetch_page(&filter(), 50, 100)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_id, "a");
        assert_eq!(records[1].fields["risk_level"], "serious");
    }

    #[tokio::test]
    async fn test_missing_records_is_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nhits": 0})))
            .mount(&server)
            .await;

        let records = fetcher_for(&server, 0)
            .fetch_page(&filter(), 500, 0)
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad q"))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher_for(&server, 3)
            .fetch_page(&filter(), 500, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(msg) if msg.contains("400")));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        let failing = Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount_as_scoped(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(&["a"])))
            .mount(&server)
            .await;

        let records = fetcher_for(&server, 1)
            .fetch_page(&filter(), 500, 0)
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        drop(failing);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let result = fetcher_for(&server, 2).fetch_page(&filter(), 500, 0).await;
        assert!(matches!(result, Err(Error::Upstream(_))));
    }

    #[tokio::test]
    async fn test_malformed_record_fails_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"recordid": "a", "fields": {}, "record_timestamp": "x"}]
            })))
            .mount(&server)
            .await;

        let result = fetcher_for(&server, 0).fetch_page(&filter(), 500, 0).await;
        assert!(matches!(result, Err(Error::MalformedRecord(_))));
    }

    #[tokio::test]
    async fn test_facets_are_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("facet", "risk_level"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body(&[])))
            .expect(1)
            .mount(&server)
            .await;

        let dataset = DatasetConfig {
            base_url: server.uri(),
            facets: vec!["risk_level".to_string()],
            ..DatasetConfig::default()
        };
        let fetcher = OdsFetcher::new(&dataset, &HttpConfig::default()).unwrap();
        assert!(fetcher.fetch_page(&filter(), 10, 0).await.unwrap().is_empty());
    }
}
