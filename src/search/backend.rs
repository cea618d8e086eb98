//! Search-engine access
//!
//! `SearchBackend` is the seam used by query execution and by backfill
//! verification. `ElasticBackend` POSTs query DSL to `/<index>/_search`,
//! trying the configured hosts in order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::errors::{RetryConfig, SearchError, SearchResult};
use crate::config::IndexConfig;

/// Raw hits as returned by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub total: u64,
    /// `_source` of each hit
    pub hits: Vec<Map<String, Value>>,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a query DSL body against `index`
    async fn search(&self, index: &str, body: &Value) -> SearchResult<SearchHits>;
}

/// HTTP client for an Elasticsearch-compatible engine
pub struct ElasticBackend {
    http: Client,
    hosts: Vec<String>,
    retry: RetryConfig,
}

impl ElasticBackend {
    pub fn new(config: &IndexConfig) -> SearchResult<Self> {
        if config.elastic_hosts.is_empty() {
            return Err(SearchError::InvalidRequest("no search hosts configured".into()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            hosts: config.elastic_hosts.iter().map(|h| normalize_host(h)).collect(),
            retry: RetryConfig::default(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn search_host(&self, host: &str, index: &str, body: &Value) -> SearchResult<SearchHits> {
        let url = format!("{host}/{}/_search", urlencoding::encode(index));
        let response = self.http.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                host: host.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = response.json().await?;
        parse_hits(&payload)
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Extract total and `_source` documents from a search response
///
/// `hits.total` may be a number or an object with a `value` field.
pub fn parse_hits(payload: &Value) -> SearchResult<SearchHits> {
    let hits = payload
        .get("hits")
        .ok_or_else(|| SearchError::MalformedResponse("missing 'hits'".into()))?;

    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::Object(o)) => o.get("value").and_then(Value::as_u64),
        _ => None,
    }
    .ok_or_else(|| SearchError::MalformedResponse("missing 'hits.total'".into()))?;

    let docs = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get("_source").and_then(Value::as_object).cloned())
                .collect()
        })
        .unwrap_or_default();

    Ok(SearchHits { total, hits: docs })
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    async fn search(&self, index: &str, body: &Value) -> SearchResult<SearchHits> {
        let mut last_error = String::from("no attempt made");

        for attempt in 0..self.retry.max_attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_for_attempt(attempt - 1)).await;
            }
            for host in &self.hosts {
                match self.search_host(host, index, body).await {
                    Ok(hits) => {
                        debug!(host = %host, total = hits.total, "search answered");
                        return Ok(hits);
                    }
                    Err(e) if e.is_transient() => {
                        warn!(host = %host, attempt, error = %e, "search host failed");
                        last_error = e.to_string();
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Err(SearchError::Unavailable(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hits_total_forms() {
        let legacy = json!({ "hits": { "total": 3, "hits": [ { "_source": { "name": "a" } } ] } });
        let parsed = parse_hits(&legacy).expect("parse");
        assert_eq!(parsed.total, 3);
        assert_eq!(parsed.hits.len(), 1);

        let modern = json!({ "hits": { "total": { "value": 7, "relation": "eq" }, "hits": [] } });
        assert_eq!(parse_hits(&modern).expect("parse").total, 7);

        assert!(matches!(
            parse_hits(&json!({ "took": 1 })),
            Err(SearchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_hosts_get_a_scheme() {
        assert_eq!(normalize_host("10.0.0.1:9200"), "http://10.0.0.1:9200");
        assert_eq!(normalize_host("https://es.local/"), "https://es.local");
    }

    #[tokio::test]
    async fn test_falls_through_to_next_host() {
        let mut bad = mockito::Server::new_async().await;
        let mut good = mockito::Server::new_async().await;

        let _down = bad
            .mock("POST", "/os_default/_search")
            .with_status(503)
            .create_async()
            .await;
        let up = good
            .mock("POST", "/os_default/_search")
            .match_body(mockito::Matcher::PartialJson(json!({ "size": 1 })))
            .with_status(200)
            .with_body(r#"{"hits":{"total":1,"hits":[{"_source":{"name":"x"}}]}}"#)
            .create_async()
            .await;

        let backend = ElasticBackend::new(&IndexConfig {
            elastic_hosts: vec![bad.url(), good.url()],
            ..IndexConfig::default()
        })
        .expect("backend");

        let hits = backend
            .search("os_default", &json!({ "size": 1 }))
            .await
            .expect("search");
        assert_eq!(hits.total, 1);
        up.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let rejected = server
            .mock("POST", "/os_default/_search")
            .with_status(400)
            .with_body("parse error")
            .expect(1)
            .create_async()
            .await;

        let backend = ElasticBackend::new(&IndexConfig {
            elastic_hosts: vec![server.url()],
            ..IndexConfig::default()
        })
        .expect("backend");

        let err = backend.search("os_default", &json!({})).await.unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 400, .. }));
        rejected.assert_async().await;
    }
}
