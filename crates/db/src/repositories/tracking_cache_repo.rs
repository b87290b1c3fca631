//! Repository for the `tracking_cache` table.
//!
//! Every write bumps `revision`. The checked writes only succeed when the
//! stored revision still matches what the caller diffed against, so two
//! refreshes of the same key can never both commit on the same baseline.

use sqlx::postgres::PgArguments;
use sqlx::query::QueryScalar;
use sqlx::{PgPool, Postgres};
use dropbinge_core::media::TrackedKey;
use dropbinge_core::snapshot::FinalState;
use dropbinge_core::types::Timestamp;

use crate::models::tracking_cache::{TrackingCacheRow, UpsertTrackingCache};
use crate::season_column;

/// Column list for `tracking_cache` queries.
const COLUMNS: &str = "\
    media_type, external_id, season_number, payload, status_raw, \
    release_date, first_air_date, last_air_date, next_air_date, \
    season_air_date, season_last_episode_date, season_count, episode_count, \
    last_episode_date, next_episode_date, final_state, final_completed_at, \
    revision, fetched_at, expires_at, updated_at";

/// Written columns, bound as `$1..$19` by [`bind_entry`].
const ENTRY_COLUMNS: &str = "\
    media_type, external_id, season_number, payload, status_raw, \
    release_date, first_air_date, last_air_date, next_air_date, \
    season_air_date, season_last_episode_date, season_count, episode_count, \
    last_episode_date, next_episode_date, final_state, final_completed_at, \
    fetched_at, expires_at";

const ENTRY_VALUES: &str = "\
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
    $11, $12, $13, $14, $15, $16, $17, $18, $19";

/// Assignments for every non-key written column.
const ENTRY_ASSIGNMENTS: &str = "\
    payload = $4, status_raw = $5, release_date = $6, first_air_date = $7, \
    last_air_date = $8, next_air_date = $9, season_air_date = $10, \
    season_last_episode_date = $11, season_count = $12, episode_count = $13, \
    last_episode_date = $14, next_episode_date = $15, final_state = $16, \
    final_completed_at = $17, fetched_at = $18, expires_at = $19, updated_at = $18";

const KEY_MATCH: &str = "media_type = $1 AND external_id = $2 AND season_number = $3";

type RevisionQuery<'q> = QueryScalar<'q, Postgres, i64, PgArguments>;

fn bind_entry<'q>(query: RevisionQuery<'q>, input: &UpsertTrackingCache<'q>) -> RevisionQuery<'q> {
    let fields = input.fields;
    query
        .bind(input.key.media_type.as_str())
        .bind(input.key.external_id)
        .bind(season_column(input.key.season_number))
        .bind(input.payload)
        .bind(fields.status.as_deref())
        .bind(fields.release_date)
        .bind(fields.first_air_date)
        .bind(fields.last_air_date)
        .bind(fields.next_air_date)
        .bind(fields.season_air_date)
        .bind(fields.season_last_episode_date)
        .bind(fields.season_count)
        .bind(fields.episode_count)
        .bind(fields.last_episode_date)
        .bind(fields.next_episode_date)
        .bind(fields.final_state.map(FinalState::as_str))
        .bind(fields.final_completed_at)
        .bind(input.fetched_at)
        .bind(input.expires_at)
}

pub struct TrackingCacheRepo;

impl TrackingCacheRepo {
    /// Load an entry regardless of expiry.
    pub async fn find(
        pool: &PgPool,
        key: &TrackedKey,
    ) -> Result<Option<TrackingCacheRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tracking_cache WHERE {KEY_MATCH}");
        sqlx::query_as::<_, TrackingCacheRow>(&query)
            .bind(key.media_type.as_str())
            .bind(key.external_id)
            .bind(season_column(key.season_number))
            .fetch_optional(pool)
            .await
    }

    /// Load an entry only if it expires strictly after `now`.
    pub async fn find_fresh(
        pool: &PgPool,
        key: &TrackedKey,
        now: Timestamp,
    ) -> Result<Option<TrackingCacheRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM tracking_cache \
             WHERE {KEY_MATCH} AND expires_at IS NOT NULL AND expires_at > $4"
        );
        sqlx::query_as::<_, TrackingCacheRow>(&query)
            .bind(key.media_type.as_str())
            .bind(key.external_id)
            .bind(season_column(key.season_number))
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Unconditional insert-or-replace. Returns the new revision.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertTrackingCache<'_>,
    ) -> Result<i64, sqlx::Error> {
        let query = format!(
            "INSERT INTO tracking_cache ({ENTRY_COLUMNS}, updated_at) \
             VALUES ({ENTRY_VALUES}, $18) \
             ON CONFLICT (media_type, external_id, season_number) DO UPDATE SET \
                 {ENTRY_ASSIGNMENTS}, revision = tracking_cache.revision + 1 \
             RETURNING revision"
        );
        bind_entry(sqlx::query_scalar(&query), input)
            .fetch_one(pool)
            .await
    }

    /// Insert an entry that the caller saw as absent.
    ///
    /// Returns `None` when another writer created the key first.
    pub async fn insert_new_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &UpsertTrackingCache<'_>,
    ) -> Result<Option<i64>, sqlx::Error> {
        let query = format!(
            "INSERT INTO tracking_cache ({ENTRY_COLUMNS}, updated_at) \
             VALUES ({ENTRY_VALUES}, $18) \
             ON CONFLICT (media_type, external_id, season_number) DO NOTHING \
             RETURNING revision"
        );
        bind_entry(sqlx::query_scalar(&query), input)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Overwrite an entry if its revision is still `expected_revision`.
    ///
    /// Returns `None` when the stored revision moved on.
    pub async fn update_at_revision_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &UpsertTrackingCache<'_>,
        expected_revision: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        let query = format!(
            "UPDATE tracking_cache SET {ENTRY_ASSIGNMENTS}, revision = revision + 1 \
             WHERE {KEY_MATCH} AND revision = $20 \
             RETURNING revision"
        );
        bind_entry(sqlx::query_scalar(&query), input)
            .bind(expected_revision)
            .fetch_optional(&mut **tx)
            .await
    }
}
