//! Subscription identifiers and cancellation handles.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::TransportError;

/// A subscription ID as issued by the node (`eth_subscribe` result).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback invoked with the raw JSON bytes of each pushed event.
pub type EventCallback = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Future returned by a subscription's cancel function.
pub type CancelFuture = BoxFuture<'static, Result<(), TransportError>>;

type CancelFn = Box<dyn FnOnce() -> CancelFuture + Send>;

/// Caller-owned handle to a registered subscription.
///
/// Holds only the subscription id and whatever channel the transport needs to
/// unregister, never the transport itself. Dropping the handle without calling
/// [`cancel`](Self::cancel) leaves the subscription registered until its
/// transport closes.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    cancel: CancelFn,
}

impl SubscriptionHandle {
    /// Wrap a transport-specific cancel function.
    pub fn new<F>(id: SubscriptionId, cancel: F) -> Self
    where
        F: FnOnce() -> CancelFuture + Send + 'static,
    {
        Self {
            id,
            cancel: Box::new(cancel),
        }
    }

    /// The id the node assigned at registration.
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Unregister the subscription. No event is delivered to the callback
    /// once this has been called.
    pub async fn cancel(self) -> Result<(), TransportError> {
        (self.cancel)().await
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
