//! Per-key async locks.
//!
//! Writers on the same key queue behind one another; writers on different keys never contend.
//! The map itself is only locked for the instant it takes to find or create a slot.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A set of async mutexes, one per key, created on demand.
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.  Access is released when the guard drops.
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

            // Slots only referenced by the map are idle.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);

            slots.entry(key).or_default().clone()
        };

        slot.lock_owned().await
    }

    /// Number of keys currently held or waited on.
    pub fn active(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.values().filter(|slot| Arc::strong_count(slot) > 1).count()
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("a").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("a").await;

        tokio::time::timeout(Duration::from_secs(1), locks.lock("b")).await.unwrap();
    }

    #[tokio::test]
    async fn idle_slots_are_dropped() {
        let locks = KeyedLocks::new();

        {
            let _a = locks.lock("a").await;
            assert_eq!(locks.active(), 1);
        }

        let _b = locks.lock("b").await;
        assert_eq!(locks.active(), 1);
        assert_eq!(locks.slots.lock().unwrap().len(), 1);
    }
}
