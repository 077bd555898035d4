//! Transport-level error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while acquiring or using a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, non-2xx status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connect/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized into the expected shape.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The borrowed transport has no pub/sub capability.
    #[error("transport does not support the subscribe method")]
    PubSubUnsupported,

    /// The factory kept failing until the construction retry policy gave up.
    #[error("transport for {url} unreachable after {attempts} attempts: {reason}")]
    Unreachable {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// No transport kind is registered for the endpoint's URL scheme.
    #[error("unsupported endpoint scheme: {0}")]
    UnsupportedScheme(String),

    /// An endpoint header name or value is not valid on the wire.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The pool was closed; no further transports are handed out.
    #[error("transport pool is closed")]
    PoolClosed,

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is transient and the operation may be
    /// retried (including transport construction).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        assert!(TransportError::Http("refused".into()).is_retryable());
        assert!(TransportError::WebSocket("reset".into()).is_retryable());
        assert!(TransportError::Timeout { ms: 10 }.is_retryable());
    }

    #[test]
    fn configuration_errors_are_not_retryable() {
        assert!(!TransportError::UnsupportedScheme("ipc".into()).is_retryable());
        assert!(!TransportError::InvalidHeader("bad\nname".into()).is_retryable());
        assert!(!TransportError::PubSubUnsupported.is_retryable());
        assert!(!TransportError::PoolClosed.is_retryable());
    }

    #[test]
    fn rpc_error_display() {
        let err = TransportError::Rpc(JsonRpcError {
            code: -32601,
            message: "method not found".into(),
            data: None,
        });
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "RPC error -32601: method not found");
    }
}
