//! Endpoint identity and the transport factory contract.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::transport::RpcTransport;

/// The (address, headers) identity of one remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    headers: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    /// Add headers sent with every request (HTTP) or with the handshake (WebSocket).
    /// Later values overwrite earlier ones with the same name.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Lowercased URL scheme (`"http"`, `"wss"`, ...), if the URL has one.
    pub fn scheme(&self) -> Option<String> {
        self.url
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
    }
}

/// Builds one transport instance for an endpoint.
///
/// Return a retryable error ([`TransportError::is_retryable`]) for transient
/// failures such as a refused connection; the pool retries those according to
/// its retry policy. Any other error fails the pool's `require` immediately.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    async fn construct(&self, endpoint: &Endpoint) -> Result<Box<dyn RpcTransport>, TransportError>;
}
