//! `eth_*` methods.
//!
//! Addresses, hashes and byte strings are passed as `0x`-prefixed hex.
//! Blocks, transactions, receipts and logs are returned as JSON values.

use serde_json::Value;

use rpcpool_core::TransportError;

use crate::client::Client;
use crate::types::{encode_hex, BlockNumber, Quantity};

/// The `eth` namespace of a [`Client`].
#[derive(Debug, Clone, Copy)]
pub struct Eth<'a> {
    client: &'a Client,
}

impl<'a> Eth<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    async fn quantity(&self, method: &str, params: Vec<Value>) -> Result<u128, TransportError> {
        let q: Quantity = self.client.call(method, params).await?;
        Ok(q.0)
    }

    async fn quantity_u64(&self, method: &str, params: Vec<Value>) -> Result<u64, TransportError> {
        let q = self.quantity(method, params).await?;
        u64::try_from(q)
            .map_err(|_| TransportError::Other(format!("{method} result {q} does not fit in u64")))
    }

    /// Node software version (`web3_clientVersion`).
    pub async fn client_version(&self) -> Result<String, TransportError> {
        self.client.call("web3_clientVersion", vec![]).await
    }

    pub async fn block_number(&self) -> Result<u64, TransportError> {
        self.quantity_u64("eth_blockNumber", vec![]).await
    }

    /// The chain id, fetched once per client. A failed fetch is retried on
    /// the next call.
    pub async fn chain_id(&self) -> Result<u64, TransportError> {
        self.client
            .chain_id
            .get_or_try_init(|| self.quantity_u64("eth_chainId", vec![]))
            .await
            .copied()
    }

    pub async fn gas_price(&self) -> Result<u64, TransportError> {
        self.quantity_u64("eth_gasPrice", vec![]).await
    }

    /// Balance in wei.
    pub async fn get_balance(&self, address: &str, block: BlockNumber) -> Result<u128, TransportError> {
        self.quantity("eth_getBalance", vec![address.into(), block.into()])
            .await
    }

    /// The account nonce.
    pub async fn get_transaction_count(
        &self,
        address: &str,
        block: BlockNumber,
    ) -> Result<u64, TransportError> {
        self.quantity_u64("eth_getTransactionCount", vec![address.into(), block.into()])
            .await
    }

    pub async fn get_code(&self, address: &str, block: BlockNumber) -> Result<String, TransportError> {
        self.client
            .call("eth_getCode", vec![address.into(), block.into()])
            .await
    }

    pub async fn get_storage_at(
        &self,
        address: &str,
        slot: &str,
        block: BlockNumber,
    ) -> Result<String, TransportError> {
        self.client
            .call("eth_getStorageAt", vec![address.into(), slot.into(), block.into()])
            .await
    }

    /// `None` if the node does not know the block.
    pub async fn get_block_by_number(
        &self,
        block: BlockNumber,
        full_transactions: bool,
    ) -> Result<Option<Value>, TransportError> {
        self.client
            .call("eth_getBlockByNumber", vec![block.into(), full_transactions.into()])
            .await
    }

    pub async fn get_block_by_hash(
        &self,
        hash: &str,
        full_transactions: bool,
    ) -> Result<Option<Value>, TransportError> {
        self.client
            .call("eth_getBlockByHash", vec![hash.into(), full_transactions.into()])
            .await
    }

    pub async fn get_transaction_by_hash(&self, hash: &str) -> Result<Option<Value>, TransportError> {
        self.client
            .call("eth_getTransactionByHash", vec![hash.into()])
            .await
    }

    /// `None` while the transaction is pending.
    pub async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<Value>, TransportError> {
        self.client
            .call("eth_getTransactionReceipt", vec![hash.into()])
            .await
    }

    pub async fn get_logs(&self, filter: Value) -> Result<Vec<Value>, TransportError> {
        self.client.call("eth_getLogs", vec![filter]).await
    }

    /// Execute a message call without creating a transaction; returns the
    /// hex-encoded return data.
    pub async fn call(&self, msg: Value, block: BlockNumber) -> Result<String, TransportError> {
        self.client.call("eth_call", vec![msg, block.into()]).await
    }

    pub async fn estimate_gas(&self, msg: Value) -> Result<u64, TransportError> {
        self.quantity_u64("eth_estimateGas", vec![msg]).await
    }

    /// Submit a signed transaction; returns its hash.
    pub async fn send_raw_transaction(&self, data: &[u8]) -> Result<String, TransportError> {
        self.client
            .call("eth_sendRawTransaction", vec![encode_hex(data).into()])
            .await
    }

    /// Submit a transaction for the node to sign with an unlocked account.
    pub async fn send_transaction(&self, tx: Value) -> Result<String, TransportError> {
        self.client.call("eth_sendTransaction", vec![tx]).await
    }

    pub async fn new_filter(&self, filter: Value) -> Result<String, TransportError> {
        self.client.call("eth_newFilter", vec![filter]).await
    }

    pub async fn new_block_filter(&self) -> Result<String, TransportError> {
        self.client.call("eth_newBlockFilter", vec![]).await
    }

    /// Logs (log filters) or block hashes (block filters) since the last poll.
    pub async fn get_filter_changes(&self, id: &str) -> Result<Vec<Value>, TransportError> {
        self.client
            .call("eth_getFilterChanges", vec![id.into()])
            .await
    }

    pub async fn uninstall_filter(&self, id: &str) -> Result<bool, TransportError> {
        self.client
            .call("eth_uninstallFilter", vec![id.into()])
            .await
    }

    pub async fn accounts(&self) -> Result<Vec<String>, TransportError> {
        self.client.call("eth_accounts", vec![]).await
    }
}
