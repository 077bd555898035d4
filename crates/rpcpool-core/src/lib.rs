//! rpcpool-core — transport capabilities and per-endpoint pooling.
//!
//! # Overview
//!
//! The core crate defines:
//!
//! - [`RpcTransport`]: request/response capability every transport implements
//! - [`PubSubTransport`]: push-subscription capability of duplex transports
//! - [`TransportFactory`] / [`Endpoint`]: how the pool builds new instances
//! - [`TransportPool`]: borrow/release pool with bounded construction retry
//! - [`SubscriptionHandle`]: caller-owned cancellation handle
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`]: wire types
//! - [`TransportError`]: structured error type
//! - [`policy`] module: retry and health tracking
//!
//! Concrete transports live in `rpcpool-http` and `rpcpool-ws`.

pub mod error;
pub mod factory;
pub mod policy;
pub mod pool;
pub mod request;
pub mod subscription;
pub mod transport;

pub use error::TransportError;
pub use factory::{Endpoint, TransportFactory};
pub use pool::{PoolConfig, PoolStats, PooledTransport, TransportPool};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId, RpcParam};
pub use subscription::{CancelFuture, EventCallback, SubscriptionHandle, SubscriptionId};
pub use transport::{HealthStatus, PubSubTransport, RpcTransport};
