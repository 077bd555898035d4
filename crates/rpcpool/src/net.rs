//! `net_*` methods.

use rpcpool_core::TransportError;

use crate::client::Client;
use crate::types::Quantity;

/// The `net` namespace of a [`Client`].
#[derive(Debug, Clone, Copy)]
pub struct Net<'a> {
    client: &'a Client,
}

impl<'a> Net<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// The network id, as a decimal string.
    pub async fn version(&self) -> Result<String, TransportError> {
        self.client.call("net_version", vec![]).await
    }

    pub async fn listening(&self) -> Result<bool, TransportError> {
        self.client.call("net_listening", vec![]).await
    }

    pub async fn peer_count(&self) -> Result<u64, TransportError> {
        let q: Quantity = self.client.call("net_peerCount", vec![]).await?;
        u64::try_from(q)
            .map_err(|_| TransportError::Other(format!("net_peerCount result {} does not fit in u64", q.0)))
    }
}
