//! Per-endpoint transport pool.
//!
//! The pool amortizes transport construction: [`TransportPool::require`] hands
//! out an idle instance when one is available and asks the factory for a new
//! one otherwise; [`TransportPool::release`] gives it back. There is no
//! admission control: borrowers never wait for another borrower, and the
//! number of live instances is unbounded. `max_idle` only bounds how many
//! instances are kept around between uses.
//!
//! Every instance is owned by exactly one party at a time: the borrower
//! between `require` and `release`, the idle stack otherwise.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::TransportError;
use crate::factory::{Endpoint, TransportFactory};
use crate::policy::{RetryConfig, RetryPolicy};
use crate::transport::{HealthStatus, RpcTransport};

/// Configuration for a [`TransportPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of idle instances kept for reuse. Instances released
    /// while the idle stack is full are closed.
    pub max_idle: usize,
    /// Idle instances older than this are closed instead of handed out.
    pub max_idle_age: Option<Duration>,
    /// Retry policy for transient factory failures.
    pub construct_retry: RetryConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: 16,
            max_idle_age: Some(Duration::from_secs(300)),
            construct_retry: RetryConfig::default(),
        }
    }
}

/// Counters describing what the pool has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances built by the factory.
    pub created: u64,
    /// `require` calls served from the idle stack.
    pub reused: u64,
    /// `release` calls.
    pub released: u64,
    /// Instances dropped: unhealthy, expired, over capacity, or closed.
    pub discarded: u64,
    /// Instances currently idle.
    pub idle: usize,
}

struct IdleTransport {
    transport: Box<dyn RpcTransport>,
    since: Instant,
}

/// Reusable collection of transports bound to one endpoint.
pub struct TransportPool {
    endpoint: Endpoint,
    factory: Arc<dyn TransportFactory>,
    retry: RetryPolicy,
    max_idle_age: Option<Duration>,
    max_idle: AtomicUsize,
    idle: Mutex<Vec<IdleTransport>>,
    closed: AtomicBool,
    created: AtomicU64,
    reused: AtomicU64,
    released: AtomicU64,
    discarded: AtomicU64,
}

impl TransportPool {
    pub fn new(endpoint: Endpoint, factory: Arc<dyn TransportFactory>, config: PoolConfig) -> Self {
        Self {
            endpoint,
            factory,
            retry: RetryPolicy::new(config.construct_retry),
            max_idle_age: config.max_idle_age,
            max_idle: AtomicUsize::new(config.max_idle),
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            released: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Take exclusive ownership of a transport.
    ///
    /// Served from the idle stack (most recently released first) when
    /// possible, otherwise built by the factory. Transient factory failures
    /// are retried per the pool's retry policy; once it gives up the result
    /// is [`TransportError::Unreachable`].
    pub async fn require(&self) -> Result<Box<dyn RpcTransport>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::PoolClosed);
        }
        if let Some(transport) = self.take_idle() {
            self.reused.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(url = %self.endpoint.url(), "reusing idle transport");
            return Ok(transport);
        }
        self.construct().await
    }

    /// Give a transport back. Must be called once per successful `require`.
    ///
    /// Unhealthy instances are closed rather than recycled, as are instances
    /// released after [`close`](Self::close) or while the idle stack is full.
    pub fn release(&self, transport: Box<dyn RpcTransport>) {
        self.released.fetch_add(1, Ordering::Relaxed);

        if transport.health() == HealthStatus::Unhealthy {
            tracing::warn!(url = %transport.url(), "discarding unhealthy transport");
            self.retire(vec![transport]);
            return;
        }

        let rejected = {
            let mut idle = self.lock_idle();
            if self.closed.load(Ordering::Acquire)
                || idle.len() >= self.max_idle.load(Ordering::Relaxed)
            {
                Some(transport)
            } else {
                idle.push(IdleTransport {
                    transport,
                    since: Instant::now(),
                });
                None
            }
        };

        if let Some(transport) = rejected {
            tracing::debug!(url = %transport.url(), "dropping released transport (pool full or closed)");
            self.retire(vec![transport]);
        }
    }

    /// Borrow a transport for the lifetime of the returned guard.
    pub async fn borrow(&self) -> Result<PooledTransport<'_>, TransportError> {
        let transport = self.require().await?;
        Ok(PooledTransport {
            pool: self,
            transport: Some(transport),
        })
    }

    /// Change how many idle instances are kept. Excess idle instances are
    /// closed immediately; the ones that stay get `max_idle` as their
    /// [`RpcTransport::set_max_connections`] hint.
    pub fn set_max_idle(&self, max_idle: usize) {
        self.max_idle.store(max_idle, Ordering::Relaxed);
        let excess: Vec<Box<dyn RpcTransport>> = {
            let mut idle = self.lock_idle();
            let excess = if idle.len() > max_idle {
                // oldest entries sit at the bottom of the stack
                let n = idle.len() - max_idle;
                idle.drain(..n).map(|entry| entry.transport).collect()
            } else {
                Vec::new()
            };
            for entry in idle.iter() {
                entry.transport.set_max_connections(max_idle);
            }
            excess
        };
        self.retire(excess);
    }

    /// Stop handing out transports and close every idle instance.
    ///
    /// Instances currently borrowed are closed when released. Returns the
    /// first error reported by an instance's `close`, after closing all.
    pub async fn close(&self) -> Result<(), TransportError> {
        let drained: Vec<IdleTransport> = {
            let mut idle = self.lock_idle();
            self.closed.store(true, Ordering::Release);
            idle.drain(..).collect()
        };

        let count = drained.len();
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);

        let mut first_err = None;
        for entry in drained {
            if let Err(e) = entry.transport.close().await {
                tracing::warn!(url = %entry.transport.url(), error = %e, "transport close failed");
                first_err.get_or_insert(e);
            }
        }
        tracing::info!(url = %self.endpoint.url(), closed = count, "transport pool closed");

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of instances currently idle.
    pub fn idle_len(&self) -> usize {
        self.lock_idle().len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: self.idle_len(),
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<IdleTransport>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the most recently released live instance, retiring expired ones.
    fn take_idle(&self) -> Option<Box<dyn RpcTransport>> {
        let mut expired = Vec::new();
        let found = {
            let mut idle = self.lock_idle();
            loop {
                match idle.pop() {
                    None => break None,
                    Some(entry) if self.is_expired(&entry) => expired.push(entry.transport),
                    Some(entry) => break Some(entry.transport),
                }
            }
        };
        if !expired.is_empty() {
            tracing::debug!(
                url = %self.endpoint.url(),
                count = expired.len(),
                "dropping expired idle transports"
            );
            self.retire(expired);
        }
        found
    }

    /// Count instances the pool gives up on and close them on a spawned
    /// task. Outside a Tokio runtime they are only dropped.
    fn retire(&self, transports: Vec<Box<dyn RpcTransport>>) {
        if transports.is_empty() {
            return;
        }
        self.discarded.fetch_add(transports.len() as u64, Ordering::Relaxed);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(count = transports.len(), "no runtime, dropping transports unclosed");
            return;
        };
        runtime.spawn(async move {
            for transport in transports {
                if let Err(e) = transport.close().await {
                    tracing::debug!(url = %transport.url(), error = %e, "closing discarded transport failed");
                }
            }
        });
    }

    fn is_expired(&self, entry: &IdleTransport) -> bool {
        self.max_idle_age
            .is_some_and(|max_age| entry.since.elapsed() >= max_age)
    }

    async fn construct(&self) -> Result<Box<dyn RpcTransport>, TransportError> {
        let url = self.endpoint.url();
        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.factory.construct(&self.endpoint).await {
                Ok(transport) => {
                    self.created.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(url = %url, attempt, "constructed transport");
                    return Ok(transport);
                }
                Err(e) if e.is_retryable() => {
                    match self.retry.next_delay_within(attempt, started.elapsed()) {
                        Some(delay) => {
                            tracing::warn!(
                                attempt,
                                delay_ms = delay.as_millis(),
                                error = %e,
                                url = %url,
                                "transport construction failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(
                                attempt,
                                error = %e,
                                url = %url,
                                "giving up on transport construction"
                            );
                            return Err(TransportError::Unreachable {
                                url: url.to_string(),
                                attempts: attempt,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for TransportPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportPool")
            .field("endpoint", &self.endpoint)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A transport borrowed from a [`TransportPool`]; released when dropped.
pub struct PooledTransport<'a> {
    pool: &'a TransportPool,
    transport: Option<Box<dyn RpcTransport>>,
}

impl Deref for PooledTransport<'_> {
    type Target = dyn RpcTransport;

    fn deref(&self) -> &Self::Target {
        self.transport
            .as_deref()
            .expect("pooled transport is present until dropped")
    }
}

impl Drop for PooledTransport<'_> {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            self.pool.release(transport);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;

    use async_trait::async_trait;

    use crate::request::{JsonRpcRequest, JsonRpcResponse};

    struct MockTransport {
        url: String,
        health: HealthStatus,
        closed: Arc<AtomicU32>,
        max_connections: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RpcTransport for MockTransport {
        async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
            Ok(JsonRpcResponse::success(req.id, serde_json::Value::Null))
        }
        fn health(&self) -> HealthStatus {
            self.health
        }
        fn url(&self) -> &str {
            &self.url
        }
        fn set_max_connections(&self, n: usize) {
            self.max_connections.store(n, Ordering::SeqCst);
        }
        async fn close(&self) -> Result<(), TransportError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails `fail_first` times with `error`, then builds `mock://N` transports.
    struct MockFactory {
        attempts: AtomicU32,
        fail_first: u32,
        error: fn() -> TransportError,
        health: HealthStatus,
        closed: Arc<AtomicU32>,
        max_connections: Arc<AtomicUsize>,
    }

    impl MockFactory {
        fn new() -> Self {
            Self {
                attempts: AtomicU32::new(0),
                fail_first: 0,
                error: || TransportError::Http("connection refused".into()),
                health: HealthStatus::Unknown,
                closed: Arc::new(AtomicU32::new(0)),
                max_connections: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(n: u32, error: fn() -> TransportError) -> Self {
            Self {
                fail_first: n,
                error,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl TransportFactory for MockFactory {
        async fn construct(
            &self,
            _endpoint: &Endpoint,
        ) -> Result<Box<dyn RpcTransport>, TransportError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                return Err((self.error)());
            }
            Ok(Box::new(MockTransport {
                url: format!("mock://{n}"),
                health: self.health,
                closed: self.closed.clone(),
                max_connections: self.max_connections.clone(),
            }))
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            multiplier: 1.0,
            jitter_fraction: 0.0,
            max_elapsed: None,
        }
    }

    /// Let spawned close tasks run.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn pool_with(factory: Arc<MockFactory>, config: PoolConfig) -> TransportPool {
        TransportPool::new(Endpoint::new("mock://node"), factory, config)
    }

    fn pool(factory: Arc<MockFactory>) -> TransportPool {
        pool_with(
            factory,
            PoolConfig {
                construct_retry: fast_retry(5),
                ..PoolConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn release_then_require_reuses_instance() {
        let factory = Arc::new(MockFactory::new());
        let pool = pool(factory.clone());

        let t = pool.require().await.unwrap();
        let url = t.url().to_string();
        pool.release(t);

        let again = pool.require().await.unwrap();
        assert_eq!(again.url(), url);
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 1);

        let stats = pool.stats();
        assert_eq!((stats.created, stats.reused, stats.released), (1, 1, 1));
    }

    #[tokio::test]
    async fn overlapping_requires_get_distinct_instances() {
        let pool = pool(Arc::new(MockFactory::new()));
        let a = pool.require().await.unwrap();
        let b = pool.require().await.unwrap();
        assert_ne!(a.url(), b.url());
        assert_eq!(pool.stats().created, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_borrowers_never_share_an_instance() {
        let pool = Arc::new(pool(Arc::new(MockFactory::new())));
        let in_use = Arc::new(Mutex::new(HashSet::new()));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let pool = pool.clone();
            let in_use = in_use.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let t = pool.require().await.unwrap();
                    let url = t.url().to_string();
                    assert!(in_use.lock().unwrap().insert(url.clone()), "{url} handed out twice");
                    tokio::task::yield_now().await;
                    in_use.lock().unwrap().remove(&url);
                    pool.release(t);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.released, 16 * 50);
        assert_eq!(stats.created + stats.reused, 16 * 50);
        assert!(stats.created <= 16);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let factory = Arc::new(MockFactory::failing(3, || {
            TransportError::WebSocket("connection refused".into())
        }));
        let pool = pool(factory.clone());

        let t = pool.require().await.unwrap();
        assert_eq!(t.url(), "mock://4");
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(pool.stats().created, 1);
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let factory = Arc::new(MockFactory::failing(u32::MAX, || {
            TransportError::Http("connection refused".into())
        }));
        let pool = pool_with(
            factory.clone(),
            PoolConfig {
                construct_retry: fast_retry(2),
                ..PoolConfig::default()
            },
        );

        match pool.require().await {
            Err(TransportError::Unreachable { url, attempts, reason }) => {
                assert_eq!(url, "mock://node");
                assert_eq!(attempts, 3);
                assert!(reason.contains("connection refused"));
            }
            other => panic!("expected Unreachable, got {:?}", other.map(|t| t.url().to_string())),
        }
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_failure_is_immediate() {
        let factory = Arc::new(MockFactory::failing(1, || {
            TransportError::UnsupportedScheme("ipc".into())
        }));
        let pool = pool(factory.clone());

        let err = pool.require().await.err().unwrap();
        assert!(matches!(err, TransportError::UnsupportedScheme(_)));
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unhealthy_transport_is_not_recycled() {
        let factory = Arc::new(MockFactory {
            health: HealthStatus::Unhealthy,
            ..MockFactory::new()
        });
        let pool = pool(factory.clone());

        let t = pool.require().await.unwrap();
        pool.release(t);
        assert_eq!(pool.idle_len(), 0);
        assert_eq!(pool.stats().discarded, 1);
        settle().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);

        let _t = pool.require().await.unwrap();
        assert_eq!(pool.stats().created, 2);
    }

    #[tokio::test]
    async fn degraded_transport_is_recycled() {
        let factory = Arc::new(MockFactory {
            health: HealthStatus::Degraded,
            ..MockFactory::new()
        });
        let pool = pool(factory);
        let t = pool.require().await.unwrap();
        pool.release(t);
        assert_eq!(pool.idle_len(), 1);
    }

    #[tokio::test]
    async fn expired_idle_transport_is_replaced() {
        let factory = Arc::new(MockFactory::new());
        let pool = pool_with(
            factory.clone(),
            PoolConfig {
                max_idle_age: Some(Duration::from_millis(20)),
                construct_retry: fast_retry(0),
                ..PoolConfig::default()
            },
        );
        let t = pool.require().await.unwrap();
        pool.release(t);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let t = pool.require().await.unwrap();
        assert_eq!(t.url(), "mock://2");
        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.reused, 0);
        settle().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn idle_stack_is_capped() {
        let factory = Arc::new(MockFactory::new());
        let pool = pool_with(
            factory.clone(),
            PoolConfig {
                max_idle: 2,
                construct_retry: fast_retry(0),
                ..PoolConfig::default()
            },
        );
        let a = pool.require().await.unwrap();
        let b = pool.require().await.unwrap();
        let c = pool.require().await.unwrap();
        pool.release(a);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.idle_len(), 2);
        assert_eq!(pool.stats().discarded, 1);

        pool.set_max_idle(1);
        assert_eq!(pool.idle_len(), 1);
        assert_eq!(pool.stats().discarded, 2);
        assert_eq!(factory.max_connections.load(Ordering::SeqCst), 1);
        settle().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 2);
        // the most recently released instance survives the shrink
        assert_eq!(pool.require().await.unwrap().url(), "mock://2");
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let pool = pool(Arc::new(MockFactory::new()));
        {
            let t = pool.borrow().await.unwrap();
            assert_eq!(t.url(), "mock://1");
            assert_eq!(pool.idle_len(), 0);
        }
        assert_eq!(pool.idle_len(), 1);
        assert_eq!(pool.stats().released, 1);
    }

    #[tokio::test]
    async fn close_drains_and_rejects() {
        let factory = Arc::new(MockFactory::new());
        let pool = pool(factory.clone());

        let a = pool.require().await.unwrap();
        let b = pool.require().await.unwrap();
        pool.release(a);

        pool.close().await.unwrap();
        assert!(pool.is_closed());
        assert_eq!(factory.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_len(), 0);

        // still-borrowed instance is closed on release
        pool.release(b);
        assert_eq!(pool.idle_len(), 0);
        settle().await;
        assert_eq!(factory.closed.load(Ordering::SeqCst), 2);

        assert!(matches!(pool.require().await, Err(TransportError::PoolClosed)));
    }
}
