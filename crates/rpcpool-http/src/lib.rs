//! rpcpool-http — JSON-RPC over HTTP POST.
//!
//! A plain (call-only) transport: it has no pub/sub capability, so
//! subscribing through a client bound to an `http(s)://` endpoint fails with
//! `TransportError::PubSubUnsupported`.

pub mod client;

pub use client::{HttpClientConfig, HttpRpcClient};
