//! Per-target exclusive locks
//!
//! Mutating helpers (configuration updates, version upgrades) must not run
//! concurrently against the same target. `KeyedLocks` hands out one async
//! mutex per target identifier; holders may keep the lock across long
//! remote operations, so callers should expect multi-second waits.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of named exclusive locks
#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another holder is active
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Try to acquire without waiting; `None` when a holder is active
    pub async fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let guard = locks.acquire("target-a").await;

        assert!(locks.try_acquire("target-a").await.is_none());
        drop(guard);
        assert!(locks.try_acquire("target-a").await.is_some());
    }

    #[tokio::test]
    async fn test_different_keys_are_independent() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("target-a").await;

        assert!(locks.try_acquire("target-b").await.is_some());
    }
}
