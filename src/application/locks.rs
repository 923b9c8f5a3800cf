use crate::domain::order::OrderNo;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async mutual exclusion keyed by `K`.
///
/// Entries are created on first use and dropped once the last holder releases
/// and nobody else is waiting, so the map only holds keys in flight.
pub struct KeyedLocks<K: Eq + Hash> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

/// Serializes every read-modify-write of one order.
pub type OrderLocks = KeyedLocks<OrderNo>;

/// Serializes changes to which order an enrollment references.
pub type EnrollmentLocks = KeyedLocks<u64>;

impl<K: Eq + Hash> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<K: Eq + Hash> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &K) -> KeyedLockGuard<K> {
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        KeyedLockGuard {
            guard: Some(guard),
            key: key.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Number of keys currently locked or awaited.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}

pub struct KeyedLockGuard<K: Eq + Hash> {
    guard: Option<OwnedMutexGuard<()>>,
    key: K,
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash> Drop for KeyedLockGuard<K> {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own reference left: no holder, no waiter.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}
