//! Consecutive-failure health tracking.
//!
//! Transports record the outcome of each request; the pool reads the
//! resulting [`HealthStatus`] when an instance is released and discards
//! instances that went `Unhealthy` instead of recycling them.
//!
//! Transitions:
//! - any success:                          → `Healthy`, failure count reset
//! - failures reach `degraded_after`:      → `Degraded`
//! - failures reach `unhealthy_after`:     → `Unhealthy`

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::transport::HealthStatus;

/// Thresholds for the health tracker.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Consecutive failures after which the transport reports `Degraded`.
    pub degraded_after: u32,
    /// Consecutive failures after which the transport reports `Unhealthy`.
    pub unhealthy_after: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_after: 1,
            unhealthy_after: 5,
        }
    }
}

/// Lock-free consecutive-failure counter.
#[derive(Debug)]
pub struct HealthTracker {
    config: HealthConfig,
    failures: AtomicU32,
    used: AtomicBool,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            failures: AtomicU32::new(0),
            used: AtomicBool::new(false),
        }
    }

    pub fn record_success(&self) {
        self.used.store(true, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.used.store(true, Ordering::Relaxed);
        let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == self.config.unhealthy_after {
            tracing::warn!(failures, "transport → unhealthy");
        }
    }

    /// Current consecutive failure count.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> HealthStatus {
        let failures = self.failures();
        if failures >= self.config.unhealthy_after {
            HealthStatus::Unhealthy
        } else if failures >= self.config.degraded_after {
            HealthStatus::Degraded
        } else if self.used.load(Ordering::Relaxed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(degraded_after: u32, unhealthy_after: u32) -> HealthTracker {
        HealthTracker::new(HealthConfig {
            degraded_after,
            unhealthy_after,
        })
    }

    #[test]
    fn starts_unknown() {
        assert_eq!(HealthTracker::default().status(), HealthStatus::Unknown);
    }

    #[test]
    fn success_is_healthy() {
        let t = tracker(1, 3);
        t.record_success();
        assert_eq!(t.status(), HealthStatus::Healthy);
    }

    #[test]
    fn degrades_then_goes_unhealthy() {
        let t = tracker(1, 3);
        t.record_failure();
        assert_eq!(t.status(), HealthStatus::Degraded);
        t.record_failure();
        assert_eq!(t.status(), HealthStatus::Degraded);
        t.record_failure();
        assert_eq!(t.status(), HealthStatus::Unhealthy);
    }

    #[test]
    fn success_resets_failure_count() {
        let t = tracker(1, 3);
        t.record_failure();
        t.record_failure();
        t.record_success();
        t.record_failure();
        t.record_failure();
        assert_eq!(t.failures(), 2);
        assert_eq!(t.status(), HealthStatus::Degraded);
    }
}
