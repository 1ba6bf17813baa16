use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// Async mutual exclusion per key. Holders of different keys never wait on
/// each other; a key's slot is freed when its last holder or waiter is gone.
pub struct KeyedLocks<K> {
    slots: Slots<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let slot = {
            let mut slots = lock_slots(&self.slots);
            slots.entry(key.clone()).or_default().clone()
        };

        let guard = slot.clone().lock_owned().await;

        KeyedGuard {
            key,
            slot,
            slots: self.slots.clone(),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

fn lock_slots<K>(slots: &Slots<K>) -> MutexGuard<'_, HashMap<K, Arc<AsyncMutex<()>>>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct KeyedGuard<K>
where
    K: Eq + Hash,
{
    key: K,
    slot: Arc<AsyncMutex<()>>,
    slots: Slots<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyedGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let mut slots = lock_slots(&self.slots);
        self.guard.take();
        // The map and this guard are the only references left.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
        }
    }
}
