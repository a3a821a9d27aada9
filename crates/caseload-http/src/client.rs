//! HTTP backend backed by `reqwest`.
//!
//! Talks to an Elasticsearch-compatible API:
//! - `GET  {endpoint}/`                      → cluster name and version
//! - `POST {endpoint}/{index}/_doc?refresh=…` → index one document
//!
//! Transient failures (connection errors, timeouts, 429, 5xx) are retried with
//! exponential backoff; anything else is returned immediately.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use caseload_core::backend::{Backend, ClusterInfo};
use caseload_core::error::BackendError;

use crate::retry::{RetryConfig, RetryPolicy};

/// Configuration for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub retry: RetryConfig,
    /// Timeout for one HTTP round trip (each retry gets its own).
    pub request_timeout: Duration,
    /// Append `refresh=true` to index requests.
    pub refresh: bool,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            refresh: true,
        }
    }
}

#[derive(Deserialize)]
struct InfoResponse {
    #[serde(default)]
    cluster_name: String,
    version: VersionInfo,
}

#[derive(Deserialize)]
struct VersionInfo {
    number: String,
}

/// Elasticsearch-style document backend.
pub struct HttpBackend {
    endpoint: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    request_timeout: Duration,
    refresh: bool,
}

impl HttpBackend {
    /// Create a backend for `endpoint` (e.g. `http://localhost:9200`).
    pub fn new(
        endpoint: impl Into<String>,
        config: HttpBackendConfig,
    ) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BackendError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http,
            retry: RetryPolicy::new(config.retry),
            request_timeout: config.request_timeout,
            refresh: config.refresh,
        })
    }

    /// Create with default configuration.
    pub fn default_for(endpoint: impl Into<String>) -> Result<Self, BackendError> {
        Self::new(endpoint, HttpBackendConfig::default())
    }

    /// Upper bound for one `index` call including every retry and pause.
    ///
    /// Callers that put their own deadline around `index` should use at least
    /// this, or retries of timed-out attempts never get a chance to run.
    pub fn record_deadline(&self) -> Duration {
        self.retry.worst_case(self.request_timeout)
    }

    fn doc_url(&self, index: &str) -> String {
        let mut url = format!("{}/{}/_doc", self.endpoint, index);
        if self.refresh {
            url.push_str("?refresh=true");
        }
        url
    }

    async fn info_once(&self) -> Result<ClusterInfo, BackendError> {
        let resp = self
            .http
            .get(format!("{}/", self.endpoint))
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;
        let resp = check_status(resp).await?;
        let body: InfoResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Serialization(e.to_string()))?;

        Ok(ClusterInfo {
            cluster_name: body.cluster_name,
            version: body.version.number,
        })
    }

    async fn index_once(&self, url: &str, document: &str) -> Result<(), BackendError> {
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(document.to_owned())
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;
        check_status(resp).await?;
        Ok(())
    }

    fn map_reqwest(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            BackendError::Http(e.to_string())
        }
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            endpoint = %self.endpoint,
                            "retrying {what}"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            endpoint = %self.endpoint,
                            "{what}: retries exhausted"
                        );
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn info(&self) -> Result<ClusterInfo, BackendError> {
        self.with_retry("info", || self.info_once()).await
    }

    async fn index(&self, index: &str, document: String) -> Result<(), BackendError> {
        let url = self.doc_url(index);
        self.with_retry("index", || self.index_once(&url, &document)).await
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_url_with_and_without_refresh() {
        let b = HttpBackend::default_for("http://localhost:9200/").unwrap();
        assert_eq!(b.endpoint(), "http://localhost:9200");
        assert_eq!(b.doc_url("covid"), "http://localhost:9200/covid/_doc?refresh=true");

        let b = HttpBackend::new(
            "http://es:9200",
            HttpBackendConfig {
                refresh: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(b.doc_url("covid"), "http://es:9200/covid/_doc");
    }

    #[test]
    fn record_deadline_spans_retries() {
        let b = HttpBackend::new(
            "http://es:9200",
            HttpBackendConfig {
                request_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(b.record_deadline(), Duration::from_millis(1_500));

        let single = HttpBackend::new(
            "http://es:9200",
            HttpBackendConfig {
                retry: RetryConfig::none(),
                request_timeout: Duration::from_millis(200),
                refresh: true,
            },
        )
        .unwrap();
        assert_eq!(single.record_deadline(), Duration::from_millis(200));
    }
}
