//! Outbox storage port.
//!
//! The dispatcher only talks to [`OutboxStore`]; [`postgres::PgOutboxStore`]
//! backs production and [`memory::MemoryOutboxStore`] backs tests and
//! database-less runs. Both enforce one row per `(change_event_id, channel)`.

use async_trait::async_trait;
use serde_json::Value;
use dropbinge_core::changes::EventType;
use dropbinge_core::channels::Channel;
use dropbinge_core::types::DbId;
use dropbinge_db::models::outbox::{ClaimedOutboxItem, OutboxItem};
use dropbinge_db::StoreError;

pub mod memory;
pub mod postgres;

/// A change event to record, with one delivery per enabled channel.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub user_id: DbId,
    pub follow_id: DbId,
    pub event_type: EventType,
    pub event_payload: Value,
    pub deliveries: Vec<NewDelivery>,
}

/// Outbox row to create for a [`NewEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewDelivery {
    pub channel: Channel,
    pub payload: Value,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Return `sending` rows whose lock is older than `stale_minutes` to
    /// `pending`. Returns the number of rows requeued.
    async fn requeue_stale(&self, channel: Channel, stale_minutes: i64) -> Result<u64, StoreError>;

    /// Atomically move up to `batch_size` due `pending` rows to `sending`,
    /// oldest first. Concurrent callers never receive the same row.
    async fn claim_batch(
        &self,
        channel: Channel,
        batch_size: i64,
    ) -> Result<Vec<ClaimedOutboxItem>, StoreError>;

    /// `sending` -> `sent`. `false` if the row was no longer sending.
    async fn mark_sent(&self, id: DbId) -> Result<bool, StoreError>;

    /// `sending` -> `pending`, due again in `delay_secs`.
    async fn schedule_retry(
        &self,
        id: DbId,
        error: &str,
        delay_secs: i64,
    ) -> Result<bool, StoreError>;

    /// `sending` -> `failed`.
    async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, StoreError>;

    async fn count_all(&self) -> Result<i64, StoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<OutboxItem>, StoreError>;

    async fn list_for_event(&self, change_event_id: DbId) -> Result<Vec<OutboxItem>, StoreError>;
}
