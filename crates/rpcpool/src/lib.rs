//! rpcpool — pooled JSON-RPC client for Ethereum-style nodes.
//!
//! A [`Client`] is bound to one endpoint. Each request borrows a transport
//! from the client's pool and gives it back afterwards, so one client can be
//! shared by any number of tasks. The transport kind follows the URL scheme:
//! `http(s)://` endpoints get a call-only HTTP transport, `ws(s)://`
//! endpoints get a WebSocket transport that also supports subscriptions.
//!
//! # Quick start
//! ```rust,no_run
//! use rpcpool::Client;
//!
//! # async fn run() -> Result<(), rpcpool::TransportError> {
//! let client = Client::builder("wss://node.example")
//!     .header("Authorization", "Bearer token")
//!     .build();
//!
//! let height = client.eth().block_number().await?;
//! let heads = client
//!     .subscribe("newHeads", serde_json::Value::Null, |bytes| {
//!         println!("{}", String::from_utf8_lossy(&bytes));
//!     })
//!     .await?;
//! heads.cancel().await?;
//! # let _ = height;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod eth;
pub mod factory;
pub mod net;
pub mod types;
pub mod web3;

pub use client::{Client, ClientBuilder, ClientConfig};
pub use eth::Eth;
pub use factory::DefaultTransportFactory;
pub use net::Net;
pub use types::{BlockNumber, Quantity};
pub use web3::Web3;

pub use rpcpool_core::{
    Endpoint, EventCallback, HealthStatus, JsonRpcError, PoolConfig, PoolStats,
    PubSubTransport, RpcTransport, SubscriptionHandle, SubscriptionId, TransportError,
    TransportFactory,
};
pub use rpcpool_core::policy::{HealthConfig, RetryConfig};
pub use rpcpool_http::HttpClientConfig;
pub use rpcpool_ws::WsClientConfig;
