//! Tracking cache rows.

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::FromRow;
use dropbinge_core::media::TrackedKey;
use dropbinge_core::snapshot::DerivedFields;
use dropbinge_core::types::Timestamp;

use crate::season_from_column;

/// A row from the `tracking_cache` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TrackingCacheRow {
    pub media_type: String,
    pub external_id: i64,
    /// `-1` for movies and full series.
    pub season_number: i32,
    pub payload: serde_json::Value,
    pub status_raw: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub first_air_date: Option<NaiveDate>,
    pub last_air_date: Option<NaiveDate>,
    pub next_air_date: Option<NaiveDate>,
    pub season_air_date: Option<NaiveDate>,
    pub season_last_episode_date: Option<NaiveDate>,
    pub season_count: Option<i32>,
    pub episode_count: Option<i32>,
    pub last_episode_date: Option<NaiveDate>,
    pub next_episode_date: Option<NaiveDate>,
    pub final_state: Option<String>,
    pub final_completed_at: Option<NaiveDate>,
    pub revision: i64,
    pub fetched_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl TrackingCacheRow {
    /// A row without `expires_at` never counts as fresh.
    pub fn is_fresh(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at > now)
    }

    pub fn season(&self) -> Option<i32> {
        season_from_column(self.season_number)
    }

    /// Rebuild the derived fields from the typed columns. An unknown
    /// `final_state` value reads as unset.
    pub fn derived_fields(&self) -> DerivedFields {
        DerivedFields {
            status: self.status_raw.clone(),
            release_date: self.release_date,
            first_air_date: self.first_air_date,
            last_air_date: self.last_air_date,
            next_air_date: self.next_air_date,
            season_air_date: self.season_air_date,
            season_last_episode_date: self.season_last_episode_date,
            season_count: self.season_count,
            episode_count: self.episode_count,
            last_episode_date: self.last_episode_date,
            next_episode_date: self.next_episode_date,
            final_state: self.final_state.as_deref().and_then(|s| s.parse().ok()),
            final_completed_at: self.final_completed_at,
        }
    }
}

/// DTO for writing a tracking cache entry.
#[derive(Debug, Clone, Copy)]
pub struct UpsertTrackingCache<'a> {
    pub key: &'a TrackedKey,
    pub payload: &'a serde_json::Value,
    pub fields: &'a DerivedFields,
    pub fetched_at: Timestamp,
    pub expires_at: Timestamp,
}
