//! Tracking cache storage port.
//!
//! [`CacheStore`] is injected into [`crate::cache::TrackingCache`]; there is
//! no process-wide fallback. [`postgres::PgCacheStore`] backs production and
//! [`memory::MemoryCacheStore`] backs tests and database-less runs.

use async_trait::async_trait;
use dropbinge_core::media::TrackedKey;
use dropbinge_core::snapshot::DerivedFields;
use dropbinge_core::types::Timestamp;
use dropbinge_db::models::change_event::ChangeEvent;
use dropbinge_db::models::tracking_cache::{TrackingCacheRow, UpsertTrackingCache};
use dropbinge_db::StoreError;
use dropbinge_events::NewEvent;
use serde_json::Value;

pub mod memory;
pub mod postgres;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Last known snapshot of one tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: TrackedKey,
    pub payload: Value,
    pub fields: DerivedFields,
    /// Bumped by every write; compared by [`CacheStore::commit_refresh`].
    pub revision: i64,
    pub fetched_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at > now)
    }

    pub(crate) fn from_row(key: TrackedKey, row: TrackingCacheRow) -> Self {
        let fields = row.derived_fields();
        Self {
            key,
            payload: row.payload,
            fields,
            revision: row.revision,
            fetched_at: row.fetched_at,
            expires_at: row.expires_at,
            updated_at: row.updated_at,
        }
    }
}

/// A snapshot about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub key: TrackedKey,
    pub payload: Value,
    pub fields: DerivedFields,
    pub fetched_at: Timestamp,
    pub expires_at: Timestamp,
}

impl CacheWrite {
    pub(crate) fn as_upsert(&self) -> UpsertTrackingCache<'_> {
        UpsertTrackingCache {
            key: &self.key,
            payload: &self.payload,
            fields: &self.fields,
            fetched_at: self.fetched_at,
            expires_at: self.expires_at,
        }
    }
}

/// Everything one refresh writes, applied all-or-nothing.
#[derive(Debug, Clone, Copy)]
pub struct RefreshCommit<'a> {
    pub write: &'a CacheWrite,
    /// Revision the events were diffed against; `None` if the key was absent.
    pub baseline_revision: Option<i64>,
    pub events: &'a [NewEvent],
}

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Load the stored entry for `key`, expired or not.
    async fn get_stored(&self, key: &TrackedKey) -> Result<Option<CacheEntry>, StoreError>;

    /// Load the entry only if it is still fresh at `now`.
    async fn get_fresh(
        &self,
        key: &TrackedKey,
        now: Timestamp,
    ) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self
            .get_stored(key)
            .await?
            .filter(|entry| entry.is_fresh(now)))
    }

    /// Unconditional upsert. Returns the new revision.
    async fn put(&self, write: &CacheWrite) -> Result<i64, StoreError>;

    /// Write the entry plus its change events and outbox rows atomically.
    ///
    /// Fails with [`StoreError::StaleBaseline`] and writes nothing when the
    /// stored revision no longer matches `commit.baseline_revision`.
    async fn commit_refresh(
        &self,
        commit: &RefreshCommit<'_>,
    ) -> Result<Vec<ChangeEvent>, StoreError>;
}
