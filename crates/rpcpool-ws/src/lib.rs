//! rpcpool-ws — WebSocket JSON-RPC transport with push subscriptions.
//!
//! # Features
//! - Request multiplexing over a single connection
//! - Subscription management (eth_subscribe / eth_unsubscribe)
//! - Auto-reconnect on disconnect (exponential backoff)
//! - Auto-resubscribe after reconnect, transparent to subscription handles

pub mod client;
pub mod subscriptions;

pub use client::{WsClientConfig, WsRpcClient};
pub use subscriptions::SubscriptionManager;
