//! Reliability policies shared by the pool and the concrete transports.
//!
//! ```text
//! TransportPool::require → [RetryPolicy] → TransportFactory::construct
//! Transport::send        → [RetryPolicy] → wire → [HealthTracker]
//! TransportPool::release → [HealthTracker::status] → recycle | discard
//! ```

pub mod health;
pub mod retry;

pub use health::{HealthConfig, HealthTracker};
pub use retry::{RetryConfig, RetryPolicy};
