//! Exponential backoff retry policy.
//!
//! Drives both transport construction in the pool and in-transport request
//! retries. Every policy is bounded: by attempt count and, optionally, by the
//! total time spent.

use std::time::Duration;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    /// Initial backoff delay.
    pub initial_backoff: Duration,
    /// Maximum backoff delay (caps exponential growth).
    pub max_backoff: Duration,
    /// Multiplier applied to backoff on each retry.
    pub multiplier: f64,
    /// Add `jitter_fraction * backoff / 2` to each delay (0.0 = no jitter).
    pub jitter_fraction: f64,
    /// Give up once this much time has passed since the first attempt.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_fraction: 0.1,
            max_elapsed: Some(Duration::from_secs(60)),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            max_elapsed: None,
            ..Self::default()
        }
    }
}

/// Stateless retry policy: computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `attempt`-th retry (1-based).
    /// Returns `None` if `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let base_ms = self.config.initial_backoff.as_millis() as f64
            * self.config.multiplier.powi((attempt - 1) as i32);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        let capped = base_ms.min(cap_ms);

        // deterministic jitter: +jitter/2
        let jitter_ms = capped * self.config.jitter_fraction * 0.5;
        let total_ms = (capped + jitter_ms) as u64;

        Some(Duration::from_millis(total_ms))
    }

    /// Like [`next_delay`](Self::next_delay), but also `None` when sleeping
    /// the delay would overrun `max_elapsed` given `elapsed` so far.
    pub fn next_delay_within(&self, attempt: u32, elapsed: Duration) -> Option<Duration> {
        let delay = self.next_delay(attempt)?;
        match self.config.max_elapsed {
            Some(budget) if elapsed + delay > budget => None,
            _ => Some(delay),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32, max_elapsed: Option<Duration>) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_fraction: 0.0,
            max_elapsed,
        })
    }

    #[test]
    fn backoff_doubles() {
        let p = policy(3, None);
        assert_eq!(p.next_delay(1).unwrap().as_millis(), 100);
        assert_eq!(p.next_delay(2).unwrap().as_millis(), 200);
        assert_eq!(p.next_delay(3).unwrap().as_millis(), 400);
        assert!(p.next_delay(4).is_none());
    }

    #[test]
    fn delay_capped_at_max() {
        let p = RetryPolicy::new(RetryConfig {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 10.0,
            jitter_fraction: 0.0,
            max_elapsed: None,
        });
        assert_eq!(p.next_delay(5).unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn jitter_adds_half_fraction() {
        let mut cfg = policy(1, None).config;
        cfg.jitter_fraction = 0.2;
        let p = RetryPolicy::new(cfg);
        assert_eq!(p.next_delay(1).unwrap().as_millis(), 110);
    }

    #[test]
    fn elapsed_budget_stops_retries() {
        let p = policy(10, Some(Duration::from_millis(250)));
        assert!(p.next_delay_within(1, Duration::ZERO).is_some());
        // 100ms spent, next delay 200ms would end at 300ms > 250ms
        assert!(p.next_delay_within(2, Duration::from_millis(100)).is_none());
    }

    #[test]
    fn no_retry_policy() {
        let p = RetryPolicy::new(RetryConfig::no_retry());
        assert!(p.next_delay(1).is_none());
        assert!(p.next_delay_within(1, Duration::ZERO).is_none());
    }
}
