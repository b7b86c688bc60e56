//! Per-key lock registry.

use crate::lock::SharedStateLock;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

struct LockEntry {
    lock: Arc<SharedStateLock>,
    created: u64,
}

/// Hands out exactly one [`SharedStateLock`] per conversation key.
///
/// The registry is bounded. Once it grows past `capacity`, the oldest quarter
/// of entries (by creation order) is dropped, skipping any lock that is still
/// held or referenced by an in-flight operation.
pub struct KeyedLockRegistry {
    locks: DashMap<String, LockEntry>,
    capacity: usize,
    sequence: AtomicU64,
    evictions: AtomicU64,
}

impl KeyedLockRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            locks: DashMap::new(),
            capacity: capacity.max(4),
            sequence: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get_lock(&self, key: &str) -> Arc<SharedStateLock> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| LockEntry {
                lock: Arc::new(SharedStateLock::new(key)),
                created: self.sequence.fetch_add(1, Ordering::Relaxed),
            })
            .lock
            .clone();

        if self.locks.len() > self.capacity {
            self.evict_oldest_quarter();
        }

        lock
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Drops every lock nobody is using. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, entry| !is_unused(entry));
        before.saturating_sub(self.locks.len())
    }

    fn evict_oldest_quarter(&self) {
        let mut by_age: Vec<(u64, String)> = self
            .locks
            .iter()
            .map(|entry| (entry.value().created, entry.key().clone()))
            .collect();
        by_age.sort_unstable();

        let quota = (by_age.len() / 4).max(1);
        let mut evicted = 0u64;
        for (_, key) in by_age.into_iter().take(quota) {
            if self.locks.remove_if(&key, |_, entry| is_unused(entry)).is_some() {
                evicted += 1;
            }
        }

        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        tracing::debug!(
            evicted,
            remaining = self.locks.len(),
            capacity = self.capacity,
            "Evicted idle conversation locks"
        );
    }
}

/// Only the registry holds the lock and nobody is inside or queued on it.
fn is_unused(entry: &LockEntry) -> bool {
    Arc::strong_count(&entry.lock) == 1 && entry.lock.is_idle()
}
