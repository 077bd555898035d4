//! The pooled JSON-RPC client.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;

use rpcpool_core::{
    Endpoint, EventCallback, JsonRpcError, JsonRpcRequest, PoolConfig, PoolStats,
    SubscriptionHandle, TransportError, TransportFactory, TransportPool,
};
use rpcpool_http::HttpClientConfig;
use rpcpool_ws::WsClientConfig;

use crate::eth::Eth;
use crate::factory::DefaultTransportFactory;
use crate::net::Net;
use crate::web3::Web3;

/// Configuration for a [`Client`] built with the default factory.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub pool: PoolConfig,
    pub http: HttpClientConfig,
    pub ws: WsClientConfig,
}

/// JSON-RPC client bound to one endpoint.
///
/// Every call borrows a transport from the client's pool for the duration of
/// one request. The client is `Send + Sync`; share it with `Arc` instead of
/// building one per task.
pub struct Client {
    pool: Arc<TransportPool>,
    next_id: AtomicU64,
    pub(crate) chain_id: OnceCell<u64>,
}

impl Client {
    /// Client for `addr` with no extra headers and default configuration.
    ///
    /// No connection is made until the first request.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::builder(addr).build()
    }

    pub fn builder(addr: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            url: addr.into(),
            headers: BTreeMap::new(),
            config: ClientConfig::default(),
            factory: None,
        }
    }

    /// Client over an existing pool.
    pub fn from_pool(pool: Arc<TransportPool>) -> Self {
        Self {
            pool,
            next_id: AtomicU64::new(1),
            chain_id: OnceCell::new(),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.pool.endpoint()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send one request and decode its result into `T`.
    ///
    /// The borrowed transport goes back to the pool before decoding, also
    /// when the request failed. A JSON-RPC error object becomes
    /// [`TransportError::Rpc`].
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let req = JsonRpcRequest::new(self.next_id(), method, params);
        tracing::trace!(method, id = %req.id, "call");

        let transport = self.pool.borrow().await?;
        let resp = transport.send(req).await;
        drop(transport);

        let value = resp?.into_result().map_err(TransportError::Rpc)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send several requests in one round trip where the transport supports
    /// it. Results come back in request order; each is the result value or
    /// the node's error object for that request.
    pub async fn batch(
        &self,
        calls: Vec<(&str, Vec<Value>)>,
    ) -> Result<Vec<Result<Value, JsonRpcError>>, TransportError> {
        let reqs: Vec<JsonRpcRequest> = calls
            .into_iter()
            .map(|(method, params)| JsonRpcRequest::new(self.next_id(), method, params))
            .collect();
        let ids: Vec<_> = reqs.iter().map(|r| r.id.clone()).collect();

        let transport = self.pool.borrow().await?;
        let resps = transport.send_batch(reqs).await;
        drop(transport);

        // batch responses may arrive in any order
        let mut by_id: HashMap<_, _> = resps?.into_iter().map(|r| (r.id.clone(), r)).collect();
        ids.into_iter()
            .map(|id| {
                by_id
                    .remove(&id)
                    .map(|r| r.into_result())
                    .ok_or_else(|| TransportError::Other(format!("no response for request {id}")))
            })
            .collect()
    }

    /// Whether transports of this client's endpoint can register
    /// subscriptions. Stable for the client's lifetime.
    pub async fn subscription_enabled(&self) -> Result<bool, TransportError> {
        let transport = self.pool.borrow().await?;
        let enabled = transport.as_pubsub().is_some();
        Ok(enabled)
    }

    /// Register a push subscription of kind `method` (`"newHeads"`, `"logs"`,
    /// ...). `on_event` receives the raw JSON of each pushed result until the
    /// returned handle is cancelled.
    ///
    /// Fails with [`TransportError::PubSubUnsupported`] on endpoints whose
    /// transport has no pub/sub capability. The transport is back in the pool
    /// when this returns; the handle does not hold it.
    pub async fn subscribe<F>(
        &self,
        method: &str,
        params: Value,
        on_event: F,
    ) -> Result<SubscriptionHandle, TransportError>
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        let transport = self.pool.borrow().await?;
        let Some(pubsub) = transport.as_pubsub() else {
            tracing::debug!(url = %transport.url(), method, "subscribe on transport without pub/sub");
            return Err(TransportError::PubSubUnsupported);
        };
        let callback: EventCallback = Arc::new(on_event);
        let handle = pubsub.subscribe(method, params, callback).await?;
        Ok(handle)
    }

    /// Close every idle transport. Later requests fail with
    /// [`TransportError::PoolClosed`]; subscription handles stay cancellable.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.pool.close().await
    }

    /// Limit how many transports the client keeps connected between requests.
    pub fn set_max_connections(&self, n: usize) {
        self.pool.set_max_idle(n);
    }

    pub fn eth(&self) -> Eth<'_> {
        Eth::new(self)
    }

    pub fn net(&self) -> Net<'_> {
        Net::new(self)
    }

    pub fn web3(&self) -> Web3<'_> {
        Web3::new(self)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("pool", &self.pool)
            .field("chain_id", &self.chain_id.get())
            .finish()
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    url: String,
    headers: BTreeMap<String, String>,
    config: ClientConfig,
    factory: Option<Arc<dyn TransportFactory>>,
}

impl ClientBuilder {
    /// Header sent with every HTTP request and with the WebSocket handshake.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn pool_config(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    /// Replace the scheme-based default factory. The HTTP and WebSocket
    /// settings of the config are ignored then.
    pub fn factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn build(self) -> Client {
        let ClientConfig { pool, http, ws } = self.config;
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(DefaultTransportFactory::new(http, ws)));
        let endpoint = Endpoint::new(self.url).with_headers(self.headers);
        Client::from_pool(Arc::new(TransportPool::new(endpoint, factory, pool)))
    }
}
