//! In-memory tracking cache for tests and database-less runs.
//!
//! Events are recorded in the shared [`MemoryOutboxStore`] so a dispatcher
//! built over the same outbox sees them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dropbinge_core::media::TrackedKey;
use dropbinge_db::models::change_event::ChangeEvent;
use dropbinge_db::StoreError;
use dropbinge_events::MemoryOutboxStore;

use super::{CacheEntry, CacheStore, CacheWrite, RefreshCommit};

#[derive(Debug)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<TrackedKey, CacheEntry>>,
    outbox: Arc<MemoryOutboxStore>,
}

impl MemoryCacheStore {
    pub fn new(outbox: Arc<MemoryOutboxStore>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            outbox,
        }
    }

    pub fn outbox(&self) -> &Arc<MemoryOutboxStore> {
        &self.outbox
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<TrackedKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Replace or create the entry, bumping its revision.
fn write_entry(entries: &mut HashMap<TrackedKey, CacheEntry>, write: &CacheWrite) -> i64 {
    let revision = entries.get(&write.key).map_or(1, |entry| entry.revision + 1);
    entries.insert(
        write.key,
        CacheEntry {
            key: write.key,
            payload: write.payload.clone(),
            fields: write.fields.clone(),
            revision,
            fetched_at: write.fetched_at,
            expires_at: Some(write.expires_at),
            updated_at: write.fetched_at,
        },
    );
    revision
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_stored(&self, key: &TrackedKey) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn put(&self, write: &CacheWrite) -> Result<i64, StoreError> {
        Ok(write_entry(&mut self.entries(), write))
    }

    async fn commit_refresh(
        &self,
        commit: &RefreshCommit<'_>,
    ) -> Result<Vec<ChangeEvent>, StoreError> {
        let key = commit.write.key;
        let mut entries = self.entries();

        let stored_revision = entries.get(&key).map(|entry| entry.revision);
        if stored_revision != commit.baseline_revision {
            return Err(StoreError::StaleBaseline(key));
        }

        // Fails before writing anything, so the entry stays untouched too.
        let events = self.outbox.record_events(commit.events)?;
        write_entry(&mut entries, commit.write);
        Ok(events)
    }
}
