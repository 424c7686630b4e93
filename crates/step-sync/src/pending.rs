//! A map from correlation key to a single-slot waiter, used by
//! `RpcConnection` to match an inbound response frame back to the `call`
//! that is blocked waiting for it. Grounded on the original `rpcWaitMap` /
//! `addRpcWait` / `delRpcWait` / `rspRpcWait` quartet: registration and
//! fulfillment are both O(1) map operations guarded by one lock, and a
//! fulfillment silently no-ops if nobody is waiting (the call already
//! timed out and removed itself).

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::sync::oneshot;

pub struct PendingRegistry<K, V> {
    waiters: Mutex<HashMap<K, oneshot::Sender<V>>>,
}

impl<K, V> Default for PendingRegistry<K, V> {
    fn default() -> Self {
        Self { waiters: Mutex::new(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone, V> PendingRegistry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new waiter under `key`. Returns `None` if `key` already
    /// has a waiter registered (the caller should treat this as a
    /// collision, per the wraparound-collision policy on call-id reuse).
    pub fn register(&self, key: K) -> Option<oneshot::Receiver<V>> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock();
        if waiters.contains_key(&key) {
            return None;
        }
        waiters.insert(key, tx);
        Some(rx)
    }

    /// Delivers `value` to the waiter registered under `key`, if any.
    /// Returns `true` if a waiter was found (it may still have dropped its
    /// receiver already, e.g. due to a timeout racing this call).
    pub fn fulfill(&self, key: &K, value: V) -> bool {
        let sender = self.waiters.lock().remove(key);
        match sender {
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }

    /// Removes the waiter registered under `key` without fulfilling it
    /// (used on timeout, and on connection teardown — dropping the sender
    /// causes the receiver to observe a closed channel).
    pub fn remove(&self, key: &K) {
        self.waiters.lock().remove(key);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.waiters.lock().contains_key(key)
    }

    /// Drains every waiter, dropping their senders so each receiver
    /// observes a closed channel. Used on connection teardown so pending
    /// callers unblock with a network error instead of hanging.
    pub fn drain(&self) {
        self.waiters.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
