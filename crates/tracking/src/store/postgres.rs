//! Postgres adapter over [`TrackingCacheRepo`].

use async_trait::async_trait;
use dropbinge_core::media::TrackedKey;
use dropbinge_core::types::Timestamp;
use dropbinge_db::models::change_event::ChangeEvent;
use dropbinge_db::repositories::TrackingCacheRepo;
use dropbinge_db::{DbPool, StoreError};
use dropbinge_events::store::postgres::insert_events_in_tx;

use super::{CacheEntry, CacheStore, CacheWrite, RefreshCommit};

#[derive(Debug, Clone)]
pub struct PgCacheStore {
    pool: DbPool,
}

impl PgCacheStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get_stored(&self, key: &TrackedKey) -> Result<Option<CacheEntry>, StoreError> {
        let row = TrackingCacheRepo::find(&self.pool, key).await?;
        Ok(row.map(|row| CacheEntry::from_row(*key, row)))
    }

    async fn get_fresh(
        &self,
        key: &TrackedKey,
        now: Timestamp,
    ) -> Result<Option<CacheEntry>, StoreError> {
        let row = TrackingCacheRepo::find_fresh(&self.pool, key, now).await?;
        Ok(row.map(|row| CacheEntry::from_row(*key, row)))
    }

    async fn put(&self, write: &CacheWrite) -> Result<i64, StoreError> {
        Ok(TrackingCacheRepo::upsert(&self.pool, &write.as_upsert()).await?)
    }

    async fn commit_refresh(
        &self,
        commit: &RefreshCommit<'_>,
    ) -> Result<Vec<ChangeEvent>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let upsert = commit.write.as_upsert();

        let revision = match commit.baseline_revision {
            None => TrackingCacheRepo::insert_new_in_tx(&mut tx, &upsert).await?,
            Some(expected) => {
                TrackingCacheRepo::update_at_revision_in_tx(&mut tx, &upsert, expected).await?
            }
        };
        if revision.is_none() {
            // Dropping the transaction rolls it back.
            return Err(StoreError::StaleBaseline(commit.write.key));
        }

        let events = insert_events_in_tx(&mut tx, commit.events).await?;
        tx.commit().await?;
        Ok(events)
    }
}
