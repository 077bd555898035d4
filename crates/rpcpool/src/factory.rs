//! URL-scheme based transport factory.

use async_trait::async_trait;

use rpcpool_core::{Endpoint, RpcTransport, TransportError, TransportFactory};
use rpcpool_http::{HttpClientConfig, HttpRpcClient};
use rpcpool_ws::{WsClientConfig, WsRpcClient};

/// Builds an HTTP transport for `http://`/`https://` endpoints and a
/// WebSocket transport for `ws://`/`wss://` endpoints.
#[derive(Debug, Clone, Default)]
pub struct DefaultTransportFactory {
    pub http: HttpClientConfig,
    pub ws: WsClientConfig,
}

impl DefaultTransportFactory {
    pub fn new(http: HttpClientConfig, ws: WsClientConfig) -> Self {
        Self { http, ws }
    }
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn construct(&self, endpoint: &Endpoint) -> Result<Box<dyn RpcTransport>, TransportError> {
        match endpoint.scheme().as_deref() {
            Some("http" | "https") => Ok(Box::new(HttpRpcClient::new(
                endpoint.url(),
                endpoint.headers(),
                self.http.clone(),
            )?)),
            Some("ws" | "wss") => Ok(Box::new(
                WsRpcClient::connect(endpoint.url(), endpoint.headers(), self.ws.clone()).await?,
            )),
            Some(other) => Err(TransportError::UnsupportedScheme(other.to_string())),
            None => Err(TransportError::UnsupportedScheme(endpoint.url().to_string())),
        }
    }
}
