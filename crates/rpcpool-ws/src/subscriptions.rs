//! WebSocket subscription registry.
//!
//! Each subscription gets a stable local id when it is requested. The
//! node-issued id changes on every reconnect (the connection task
//! re-subscribes and calls [`SubscriptionManager::rekey`]), while handles keep
//! referring to the local id.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use rpcpool_core::subscription::{EventCallback, SubscriptionId};

struct SubscriptionEntry {
    /// Id the node currently knows this subscription by.
    remote: SubscriptionId,
    /// Full `eth_subscribe` params, kept for re-subscribing.
    params: Vec<Value>,
    callback: EventCallback,
    /// Re-subscribe sent on a fresh connection, no new id yet.
    resubscribing: bool,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<u64, SubscriptionEntry>,
    by_remote: HashMap<SubscriptionId, u64>,
    next_local: u64,
}

/// Active subscriptions of one WebSocket connection.
#[derive(Clone, Default)]
pub struct SubscriptionManager {
    inner: Arc<Mutex<Registry>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a local id for a subscription about to be requested.
    pub fn reserve(&self) -> u64 {
        let mut reg = self.lock();
        reg.next_local += 1;
        reg.next_local
    }

    /// Register a confirmed subscription.
    pub fn insert(
        &self,
        local: u64,
        remote: SubscriptionId,
        params: Vec<Value>,
        callback: EventCallback,
    ) {
        let mut reg = self.lock();
        reg.by_remote.insert(remote.clone(), local);
        reg.entries.insert(
            local,
            SubscriptionEntry {
                remote,
                params,
                callback,
                resubscribing: false,
            },
        );
    }

    /// Deliver a pushed result to the subscription's callback.
    ///
    /// The callback runs with the registry locked, so once [`remove`]
    /// returns no further event reaches it. A panicking callback is logged
    /// and does not take the connection down. Returns `false` for unknown ids.
    ///
    /// [`remove`]: Self::remove
    pub fn dispatch(&self, remote: &SubscriptionId, result: &Value) -> bool {
        let reg = self.lock();
        let Some(entry) = reg
            .by_remote
            .get(remote)
            .and_then(|local| reg.entries.get(local))
        else {
            return false;
        };
        match serde_json::to_vec(result) {
            Ok(bytes) => {
                let callback = &entry.callback;
                if panic::catch_unwind(AssertUnwindSafe(|| callback(bytes))).is_err() {
                    tracing::error!(subscription = %remote, "subscription callback panicked");
                }
            }
            Err(e) => tracing::warn!(subscription = %remote, error = %e, "unserializable push event"),
        }
        true
    }

    /// Remove a subscription, returning the id to unsubscribe on the node.
    ///
    /// `None` if the subscription is unknown or waiting on a re-subscribe;
    /// in the latter case the connection task unsubscribes the new id once
    /// it arrives and [`rekey`](Self::rekey) finds the entry gone.
    pub fn remove(&self, local: u64) -> Option<SubscriptionId> {
        let mut reg = self.lock();
        let entry = reg.entries.remove(&local)?;
        reg.by_remote.remove(&entry.remote);
        (!entry.resubscribing).then_some(entry.remote)
    }

    /// Point a subscription at the id the node issued after re-subscribing.
    /// Returns `false` if the subscription was removed in the meantime.
    pub fn rekey(&self, local: u64, remote: SubscriptionId) -> bool {
        let mut reg = self.lock();
        let Some(old) = reg
            .entries
            .get_mut(&local)
            .map(|entry| {
                entry.resubscribing = false;
                std::mem::replace(&mut entry.remote, remote.clone())
            })
        else {
            return false;
        };
        reg.by_remote.remove(&old);
        reg.by_remote.insert(remote, local);
        true
    }

    /// Mark every active subscription as re-subscribing and return its
    /// `(local id, eth_subscribe params)`.
    pub fn begin_resubscribe(&self) -> Vec<(u64, Vec<Value>)> {
        self.lock()
            .entries
            .iter_mut()
            .map(|(local, e)| {
                e.resubscribing = true;
                (*local, e.params.clone())
            })
            .collect()
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns `true` if there are no active subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
