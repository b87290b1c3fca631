//! Per-key async mutexes serializing refreshes of one tracked entity
//! inside a process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dropbinge_core::media::TrackedKey;
use tokio::sync::OwnedMutexGuard;

/// Idle locks are pruned once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<TrackedKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held for the duration of one refresh.
#[derive(Debug)]
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other caller holds `key`.
    pub async fn acquire(&self, key: TrackedKey) -> KeyGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() >= PRUNE_THRESHOLD {
                // Only the map holds an idle lock.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(key).or_default())
        };
        KeyGuard {
            _guard: lock.lock_owned().await,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
