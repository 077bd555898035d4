//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! Features:
//! - Endpoint headers sent with every request
//! - Automatic retry with exponential backoff for transient errors
//! - Consecutive-failure health tracking, read by the pool at release
//! - Batch request support (true HTTP batching)

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use rpcpool_core::error::TransportError;
use rpcpool_core::policy::{HealthConfig, HealthTracker, RetryConfig, RetryPolicy};
use rpcpool_core::request::{JsonRpcRequest, JsonRpcResponse};
use rpcpool_core::transport::{HealthStatus, RpcTransport};

/// Configuration for `HttpRpcClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub health: HealthConfig,
    pub request_timeout: Duration,
    /// Idle keep-alive connections reqwest keeps per host.
    pub max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig {
                max_retries: 3,
                max_elapsed: None,
                ..RetryConfig::default()
            },
            health: HealthConfig::default(),
            request_timeout: Duration::from_secs(30),
            max_idle_per_host: 8,
        }
    }
}

/// HTTP JSON-RPC transport.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    health: HealthTracker,
    request_timeout: Duration,
}

impl HttpRpcClient {
    /// Create a client for the given JSON-RPC endpoint URL.
    ///
    /// Fails with `InvalidHeader` if a header name or value cannot be sent.
    pub fn new(
        url: impl Into<String>,
        headers: &BTreeMap<String, String>,
        config: HttpClientConfig,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .default_headers(header_map(headers)?)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            health: HealthTracker::new(config.health),
            request_timeout: config.request_timeout,
        })
    }

    /// Create with no extra headers and default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, &BTreeMap::new(), HttpClientConfig::default())
    }

    async fn post<B, R>(&self, body: &B) -> Result<R, TransportError>
    where
        B: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let resp = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        ms: self.request_timeout.as_millis() as u64,
                    }
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Convert endpoint headers into a reqwest header map.
fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(format!("{name}: {value}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.post::<_, JsonRpcResponse>(&req).await {
                Ok(resp) => {
                    self.health.record_success();
                    return Ok(resp);
                }
                Err(e) if e.is_retryable() => {
                    self.health.record_failure();
                    match self.retry.next_delay(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                attempt,
                                delay_ms = delay.as_millis(),
                                error = %e,
                                url = %self.url,
                                method = %req.method,
                                "retrying request"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(
                                attempt,
                                error = %e,
                                url = %self.url,
                                method = %req.method,
                                "max retries exceeded"
                            );
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// True HTTP batch: send all requests as a JSON array in one HTTP call.
    async fn send_batch(
        &self,
        reqs: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        if reqs.is_empty() {
            return Ok(vec![]);
        }
        match self.post::<_, Vec<JsonRpcResponse>>(&reqs).await {
            Ok(resps) => {
                self.health.record_success();
                Ok(resps)
            }
            Err(e) => {
                if e.is_retryable() {
                    self.health.record_failure();
                }
                Err(e)
            }
        }
    }

    fn health(&self) -> HealthStatus {
        self.health.status()
    }

    fn url(&self) -> &str {
        &self.url
    }
}
