//! Postgres adapter over [`OutboxRepo`] and [`ChangeEventRepo`].

use async_trait::async_trait;
use dropbinge_core::channels::Channel;
use dropbinge_core::types::DbId;
use dropbinge_db::models::change_event::{ChangeEvent, NewChangeEvent};
use dropbinge_db::models::outbox::{ClaimedOutboxItem, NewOutboxItem, OutboxItem};
use dropbinge_db::repositories::{ChangeEventRepo, OutboxRepo};
use dropbinge_db::{DbPool, StoreError};

use super::{NewEvent, OutboxStore};

#[derive(Debug, Clone)]
pub struct PgOutboxStore {
    pool: DbPool,
}

impl PgOutboxStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Insert events and their outbox rows inside the caller's transaction.
///
/// A duplicate `(change_event_id, channel)` surfaces as a unique violation
/// and aborts the whole transaction.
pub async fn insert_events_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    events: &[NewEvent],
) -> Result<Vec<ChangeEvent>, sqlx::Error> {
    let mut inserted = Vec::with_capacity(events.len());
    for event in events {
        let row = ChangeEventRepo::insert_in_tx(
            tx,
            &NewChangeEvent {
                user_id: event.user_id,
                follow_id: event.follow_id,
                event_type: event.event_type.as_str(),
                event_payload: &event.event_payload,
            },
        )
        .await?;

        for delivery in &event.deliveries {
            OutboxRepo::insert_in_tx(
                tx,
                &NewOutboxItem {
                    user_id: event.user_id,
                    follow_id: event.follow_id,
                    change_event_id: row.id,
                    channel: delivery.channel.as_str(),
                    payload: &delivery.payload,
                },
            )
            .await?;
        }
        inserted.push(row);
    }
    Ok(inserted)
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn requeue_stale(&self, channel: Channel, stale_minutes: i64) -> Result<u64, StoreError> {
        Ok(OutboxRepo::requeue_stale(&self.pool, channel.as_str(), stale_minutes).await?)
    }

    async fn claim_batch(
        &self,
        channel: Channel,
        batch_size: i64,
    ) -> Result<Vec<ClaimedOutboxItem>, StoreError> {
        Ok(OutboxRepo::claim_batch(&self.pool, channel.as_str(), batch_size).await?)
    }

    async fn mark_sent(&self, id: DbId) -> Result<bool, StoreError> {
        Ok(OutboxRepo::mark_sent(&self.pool, id).await?)
    }

    async fn schedule_retry(
        &self,
        id: DbId,
        error: &str,
        delay_secs: i64,
    ) -> Result<bool, StoreError> {
        Ok(OutboxRepo::schedule_retry(&self.pool, id, error, delay_secs).await?)
    }

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, StoreError> {
        Ok(OutboxRepo::mark_failed(&self.pool, id, error).await?)
    }

    async fn count_all(&self) -> Result<i64, StoreError> {
        Ok(OutboxRepo::count_all(&self.pool).await?)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<OutboxItem>, StoreError> {
        Ok(OutboxRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_for_event(&self, change_event_id: DbId) -> Result<Vec<OutboxItem>, StoreError> {
        Ok(OutboxRepo::list_for_event(&self.pool, change_event_id).await?)
    }
}
