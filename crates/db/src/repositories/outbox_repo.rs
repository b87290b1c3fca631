//! Repository for the `notification_outbox` table.
//!
//! Status literals come from [`OutboxStatus`]; the dispatcher drives every
//! transition through the methods below.

use sqlx::PgPool;
use dropbinge_core::channels::CHANNEL_WHATSAPP;
use dropbinge_core::outbox::OutboxStatus;
use dropbinge_core::types::DbId;

use crate::models::outbox::{ClaimedOutboxItem, NewOutboxItem, OutboxItem};

/// Column list for `notification_outbox` queries.
const COLUMNS: &str = "\
    id, user_id, follow_id, change_event_id, channel, payload, status, \
    attempt_count, last_attempt_at, last_error, locked_at, next_attempt_at, \
    created_at, sent_at";

pub struct OutboxRepo;

impl OutboxRepo {
    /// Insert a pending row inside the caller's transaction.
    ///
    /// Fails with a unique violation on `uq_outbox_event_channel` if the
    /// event already has a row for this channel.
    pub async fn insert_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &NewOutboxItem<'_>,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO notification_outbox \
                 (user_id, follow_id, change_event_id, channel, payload, status) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(input.user_id)
        .bind(input.follow_id)
        .bind(input.change_event_id)
        .bind(input.channel)
        .bind(input.payload)
        .bind(OutboxStatus::Pending.as_str())
        .fetch_one(&mut **tx)
        .await
    }

    /// Return `sending` rows of `channel` whose lock is older than
    /// `stale_minutes` to `pending`. Returns the number of rows requeued.
    pub async fn requeue_stale(
        pool: &PgPool,
        channel: &str,
        stale_minutes: i64,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_outbox \
             SET status = $2, locked_at = NULL \
             WHERE channel = $1 AND status = $3 \
               AND locked_at IS NOT NULL \
               AND locked_at < NOW() - ($4 || ' minutes')::INTERVAL",
        )
        .bind(channel)
        .bind(OutboxStatus::Pending.as_str())
        .bind(OutboxStatus::Sending.as_str())
        .bind(stale_minutes.to_string())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Atomically claim up to `batch_size` due rows of `channel`.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent dispatchers never claim
    /// the same row. Claimed rows move to `sending` with `locked_at` set and
    /// `attempt_count` incremented. Results are ordered oldest first.
    pub async fn claim_batch(
        pool: &PgPool,
        channel: &str,
        batch_size: i64,
    ) -> Result<Vec<ClaimedOutboxItem>, sqlx::Error> {
        let query = format!(
            "WITH picked AS ( \
                 SELECT id FROM notification_outbox \
                 WHERE channel = $1 AND status = $2 \
                   AND (next_attempt_at IS NULL OR next_attempt_at <= NOW()) \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT $3 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE notification_outbox o \
             SET status = $4, locked_at = NOW(), last_attempt_at = NOW(), \
                 attempt_count = o.attempt_count + 1 \
             FROM picked, users u \
             WHERE o.id = picked.id AND u.id = o.user_id \
             RETURNING o.id, o.user_id, o.follow_id, o.change_event_id, o.channel, \
                 o.payload, o.attempt_count, o.created_at, \
                 CASE WHEN o.channel = '{CHANNEL_WHATSAPP}' THEN u.phone_number ELSE u.email END \
                     AS to_address"
        );
        let mut claimed = sqlx::query_as::<_, ClaimedOutboxItem>(&query)
            .bind(channel)
            .bind(OutboxStatus::Pending.as_str())
            .bind(batch_size)
            .bind(OutboxStatus::Sending.as_str())
            .fetch_all(pool)
            .await?;
        claimed.sort_by_key(|item| (item.created_at, item.id));
        Ok(claimed)
    }

    /// `sending` -> `sent`. Returns `false` if the row was no longer sending.
    pub async fn mark_sent(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_outbox \
             SET status = $2, sent_at = NOW(), locked_at = NULL, last_error = NULL \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(OutboxStatus::Sent.as_str())
        .bind(OutboxStatus::Sending.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `sending` -> `pending`, due again after `delay_secs`.
    pub async fn schedule_retry(
        pool: &PgPool,
        id: DbId,
        error: &str,
        delay_secs: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_outbox \
             SET status = $2, locked_at = NULL, last_error = $4, \
                 next_attempt_at = NOW() + ($5 || ' seconds')::INTERVAL \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(OutboxStatus::Pending.as_str())
        .bind(OutboxStatus::Sending.as_str())
        .bind(error)
        .bind(delay_secs.to_string())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `sending` -> `failed` (terminal).
    pub async fn mark_failed(pool: &PgPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_outbox \
             SET status = $2, locked_at = NULL, last_error = $4, next_attempt_at = NULL \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(OutboxStatus::Failed.as_str())
        .bind(OutboxStatus::Sending.as_str())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<OutboxItem>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_outbox WHERE id = $1");
        sqlx::query_as::<_, OutboxItem>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Rows created for one change event, ordered by channel.
    pub async fn list_for_event(
        pool: &PgPool,
        change_event_id: DbId,
    ) -> Result<Vec<OutboxItem>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_outbox \
             WHERE change_event_id = $1 \
             ORDER BY channel ASC"
        );
        sqlx::query_as::<_, OutboxItem>(&query)
            .bind(change_event_id)
            .fetch_all(pool)
            .await
    }

    pub async fn count_all(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notification_outbox")
            .fetch_one(pool)
            .await
    }

    pub async fn count_by_status(pool: &PgPool, status: OutboxStatus) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notification_outbox WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(pool)
            .await
    }
}
