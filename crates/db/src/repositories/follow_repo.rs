//! Repository for `follows` and their `follow_prefs`.
//!
//! Follows without a preferences row read back with the defaults.

use sqlx::PgPool;
use dropbinge_core::preferences::FollowPreferences;
use dropbinge_core::types::DbId;

use crate::models::follow::{CreateFollow, FollowWithPrefs};

/// Select list for follow + preferences queries (`f` = follows, `p` = follow_prefs).
const COLUMNS: &str = "\
    f.id, f.user_id, f.target_type, f.external_id, f.season_number, \
    COALESCE(p.notify_date_changes, TRUE) AS notify_date_changes, \
    COALESCE(p.notify_status_milestones, FALSE) AS notify_status_milestones, \
    COALESCE(p.notify_season_binge_ready, TRUE) AS notify_season_binge_ready, \
    COALESCE(p.notify_episode_drops, FALSE) AS notify_episode_drops, \
    COALESCE(p.notify_full_run_concluded, TRUE) AS notify_full_run_concluded, \
    COALESCE(p.channel_email, TRUE) AS channel_email, \
    COALESCE(p.channel_whatsapp, FALSE) AS channel_whatsapp, \
    COALESCE(p.frequency, 'important_only') AS frequency, \
    f.created_at";

const FROM: &str = "follows f LEFT JOIN follow_prefs p ON p.follow_id = f.id";

pub struct FollowRepo;

impl FollowRepo {
    /// Insert a follow and its preferences in one transaction.
    pub async fn create(
        pool: &PgPool,
        input: &CreateFollow,
    ) -> Result<FollowWithPrefs, sqlx::Error> {
        let prefs = input.preferences.clone().unwrap_or_default();
        let mut tx = pool.begin().await?;

        let follow_id: DbId = sqlx::query_scalar(
            "INSERT INTO follows (user_id, target_type, external_id, season_number) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(input.user_id)
        .bind(&input.target_type)
        .bind(input.external_id)
        .bind(input.season_number)
        .fetch_one(&mut *tx)
        .await?;

        Self::upsert_prefs_in_tx(&mut tx, follow_id, &prefs).await?;
        tx.commit().await?;

        Self::find_by_id(pool, follow_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Replace the preferences of a follow.
    pub async fn update_prefs(
        pool: &PgPool,
        follow_id: DbId,
        prefs: &FollowPreferences,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        Self::upsert_prefs_in_tx(&mut tx, follow_id, prefs).await?;
        tx.commit().await
    }

    async fn upsert_prefs_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        follow_id: DbId,
        prefs: &FollowPreferences,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO follow_prefs (follow_id, notify_date_changes, notify_status_milestones, \
                 notify_season_binge_ready, notify_episode_drops, notify_full_run_concluded, \
                 channel_email, channel_whatsapp, frequency) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (follow_id) DO UPDATE SET \
                 notify_date_changes = EXCLUDED.notify_date_changes, \
                 notify_status_milestones = EXCLUDED.notify_status_milestones, \
                 notify_season_binge_ready = EXCLUDED.notify_season_binge_ready, \
                 notify_episode_drops = EXCLUDED.notify_episode_drops, \
                 notify_full_run_concluded = EXCLUDED.notify_full_run_concluded, \
                 channel_email = EXCLUDED.channel_email, \
                 channel_whatsapp = EXCLUDED.channel_whatsapp, \
                 frequency = EXCLUDED.frequency, \
                 updated_at = NOW()",
        )
        .bind(follow_id)
        .bind(prefs.notify_date_changes)
        .bind(prefs.notify_status_milestones)
        .bind(prefs.notify_season_binge_ready)
        .bind(prefs.notify_episode_drops)
        .bind(prefs.notify_full_run_concluded)
        .bind(prefs.channel_email)
        .bind(prefs.channel_whatsapp)
        .bind(&prefs.frequency)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<FollowWithPrefs>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} WHERE f.id = $1");
        sqlx::query_as::<_, FollowWithPrefs>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All follows of one user, oldest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<FollowWithPrefs>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM {FROM} \
             WHERE f.user_id = $1 \
             ORDER BY f.id ASC"
        );
        sqlx::query_as::<_, FollowWithPrefs>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Follows for a bulk refresh, ordered by user then follow id.
    ///
    /// `limit_users` keeps only the lowest N user ids; `limit_follows` keeps
    /// at most N follows per user. `None` means no cap.
    pub async fn list_for_refresh(
        pool: &PgPool,
        limit_users: Option<i64>,
        limit_follows: Option<i64>,
    ) -> Result<Vec<FollowWithPrefs>, sqlx::Error> {
        let query = format!(
            "SELECT * FROM ( \
                 SELECT {COLUMNS}, \
                     ROW_NUMBER() OVER (PARTITION BY f.user_id ORDER BY f.id) AS user_rank \
                 FROM {FROM} \
                 WHERE $1::BIGINT IS NULL \
                    OR f.user_id IN (SELECT id FROM users ORDER BY id ASC LIMIT $1) \
             ) ranked \
             WHERE $2::BIGINT IS NULL OR user_rank <= $2 \
             ORDER BY user_id ASC, id ASC"
        );
        sqlx::query_as::<_, FollowWithPrefs>(&query)
            .bind(limit_users)
            .bind(limit_follows)
            .fetch_all(pool)
            .await
    }
}
