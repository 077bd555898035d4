//! `web3_*` methods.

use rpcpool_core::TransportError;

use crate::client::Client;
use crate::types::encode_hex;

/// The `web3` namespace of a [`Client`].
#[derive(Debug, Clone, Copy)]
pub struct Web3<'a> {
    client: &'a Client,
}

impl<'a> Web3<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn client_version(&self) -> Result<String, TransportError> {
        self.client.call("web3_clientVersion", vec![]).await
    }

    /// Keccak-256 of `data`, computed by the node.
    pub async fn sha3(&self, data: &[u8]) -> Result<String, TransportError> {
        self.client
            .call("web3_sha3", vec![encode_hex(data).into()])
            .await
    }
}
