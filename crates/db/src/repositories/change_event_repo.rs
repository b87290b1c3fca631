//! Repository for the `change_events` table.

use sqlx::PgPool;
use dropbinge_core::types::DbId;

use crate::models::change_event::{ChangeEvent, NewChangeEvent};

/// Column list for `change_events` queries.
const COLUMNS: &str = "id, user_id, follow_id, event_type, event_payload, created_at";

pub struct ChangeEventRepo;

impl ChangeEventRepo {
    /// Insert an event inside the caller's transaction.
    pub async fn insert_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &NewChangeEvent<'_>,
    ) -> Result<ChangeEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO change_events (user_id, follow_id, event_type, event_payload) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ChangeEvent>(&query)
            .bind(input.user_id)
            .bind(input.follow_id)
            .bind(input.event_type)
            .bind(input.event_payload)
            .fetch_one(&mut **tx)
            .await
    }

    /// Events recorded for one follow, oldest first.
    pub async fn list_for_follow(
        pool: &PgPool,
        follow_id: DbId,
    ) -> Result<Vec<ChangeEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM change_events \
             WHERE follow_id = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, ChangeEvent>(&query)
            .bind(follow_id)
            .fetch_all(pool)
            .await
    }

    pub async fn count_all(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM change_events")
            .fetch_one(pool)
            .await
    }
}
