//! Transport capability traits.
//!
//! Every transport can answer a request ([`RpcTransport`]). Transports that
//! can also register server-push subscriptions additionally implement
//! [`PubSubTransport`] and expose it through [`RpcTransport::as_pubsub`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::subscription::{EventCallback, SubscriptionHandle};

/// Transport health, consulted by the pool when an instance is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Transport is responding normally.
    Healthy,
    /// Transport is responding but recently failed (or is reconnecting).
    Degraded,
    /// Transport is broken and must not be handed out again.
    Unhealthy,
    /// Health status is unknown (not yet used, or not tracked).
    Unknown,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// The request/response capability every transport implements.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Object Safety
/// The trait is object-safe; the pool stores instances as
/// `Box<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Send a batch of JSON-RPC requests.
    ///
    /// Default implementation sends them sequentially; override for true batching.
    async fn send_batch(
        &self,
        reqs: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, TransportError> {
        let mut responses = Vec::with_capacity(reqs.len());
        for req in reqs {
            responses.push(self.send(req).await?);
        }
        Ok(responses)
    }

    /// Return the current health status of this transport.
    fn health(&self) -> HealthStatus {
        HealthStatus::Unknown
    }

    /// Return the transport's endpoint URL.
    fn url(&self) -> &str;

    /// The pub/sub capability of this transport, if it has one.
    fn as_pubsub(&self) -> Option<&dyn PubSubTransport> {
        None
    }

    /// Hint the maximum number of underlying connections. Best-effort;
    /// transports that hold exactly one connection ignore it.
    fn set_max_connections(&self, _n: usize) {}

    /// Release the transport's underlying resources.
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Push-subscription capability, available on duplex transports only.
#[async_trait]
pub trait PubSubTransport: RpcTransport {
    /// Register a subscription of kind `method` (e.g. `"newHeads"`, `"logs"`).
    ///
    /// `on_event` is invoked with the raw JSON bytes of every pushed result
    /// until the returned handle is cancelled. The handle does not borrow the
    /// transport, so it stays valid after the transport went back to a pool.
    async fn subscribe(
        &self,
        method: &str,
        params: Value,
        on_event: EventCallback,
    ) -> Result<SubscriptionHandle, TransportError>;
}
