//! Per-key operation serialization.
//!
//! A mutating operation acquires the lock for its [`LockKey`] for its whole
//! duration, so read-modify-write sequences spanning several store calls
//! never interleave with another operation on the same key. Locks are
//! in-process and advisory; the store's own transactions still apply.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use drivehub_core::types::LockKey;

/// Table of per-key asynchronous mutexes.
///
/// Entries are created on first use and removed when the last holder or
/// waiter is gone, so the table only contains keys that are in use.
#[derive(Debug, Default)]
pub struct OperationSerializer {
    locks: DashMap<LockKey, Arc<Mutex<()>>>,
}

/// Exclusive hold on one key. Dropping it releases the key, including
/// during unwinding.
#[derive(Debug)]
pub struct LockGuard<'a> {
    serializer: &'a OperationSerializer,
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the table's own handle left: nobody holds or waits.
        self.serializer
            .locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
        trace!(key = %self.key, "Released operation lock");
    }
}

impl OperationSerializer {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it.
    ///
    /// Acquisition never fails. Acquiring a key already held by the same
    /// logical operation deadlocks; take each key once per operation.
    pub async fn acquire(&self, key: LockKey) -> LockGuard<'_> {
        let mutex = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        trace!(key = %key, "Acquired operation lock");
        LockGuard {
            serializer: self,
            key,
            guard: Some(guard),
        }
    }

    /// Run `f` while holding `key` and return its result unchanged.
    pub async fn with_lock<T, F, Fut>(&self, key: LockKey, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        f().await
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.locks.len()
    }
}
