//! Adaptive-TTL snapshot cache.
//!
//! Expired entries are never returned by [`TrackingCache::get`] but stay
//! stored: the change detector diffs against them on the next fetch.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use dropbinge_core::clock::Clock;
use dropbinge_core::media::{MediaType, TrackedKey};
use dropbinge_core::snapshot::DerivedFields;
use dropbinge_core::ttl::{tracking_ttl_seconds, ttl_for_fields};
use dropbinge_core::types::Timestamp;
use dropbinge_db::models::change_event::ChangeEvent;
use dropbinge_db::StoreError;
use serde_json::Value;

use crate::store::{CacheEntry, CacheStore, CacheWrite, RefreshCommit};

#[derive(Clone)]
pub struct TrackingCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl TrackingCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Fresh entry for `key`, or `None` if missing or expired.
    pub async fn get(&self, key: &TrackedKey) -> Result<Option<CacheEntry>, StoreError> {
        self.get_at(key, self.clock.now()).await
    }

    pub(crate) async fn get_at(
        &self,
        key: &TrackedKey,
        now: Timestamp,
    ) -> Result<Option<CacheEntry>, StoreError> {
        self.store.get_fresh(key, now).await
    }

    /// Stored entry for `key` regardless of expiry.
    pub async fn get_stored(&self, key: &TrackedKey) -> Result<Option<CacheEntry>, StoreError> {
        self.store.get_stored(key).await
    }

    /// Upsert a snapshot that expires `ttl_seconds` from now. Returns the
    /// new revision.
    pub async fn put(
        &self,
        key: &TrackedKey,
        snapshot: &Value,
        fields: &DerivedFields,
        ttl_seconds: i64,
    ) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let write = CacheWrite {
            key: *key,
            payload: snapshot.clone(),
            fields: fields.clone(),
            fetched_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
        };
        self.store.put(&write).await
    }

    /// TTL in seconds for a freshly fetched snapshot.
    pub fn compute_ttl(media_type: MediaType, snapshot: &Value, today: NaiveDate) -> i64 {
        tracking_ttl_seconds(media_type, snapshot, today)
    }

    /// Build the write for a fetched snapshot, extracting fields against
    /// `now`'s date.
    pub(crate) fn prepare_write(key: TrackedKey, snapshot: Value, now: Timestamp) -> CacheWrite {
        let fields = DerivedFields::extract(key.media_type, &snapshot, now.date_naive());
        let ttl = ttl_for_fields(key.media_type, &fields);
        CacheWrite {
            key,
            payload: snapshot,
            fields,
            fetched_at: now,
            expires_at: now + Duration::seconds(ttl),
        }
    }

    pub(crate) async fn commit_refresh(
        &self,
        commit: &RefreshCommit<'_>,
    ) -> Result<Vec<ChangeEvent>, StoreError> {
        self.store.commit_refresh(commit).await
    }
}
