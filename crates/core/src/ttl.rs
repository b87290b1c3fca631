//! Adaptive expiry for tracking cache entries.
//!
//! Entities that are likely to change soon are refetched every six hours;
//! settled ones are kept for a week to bound upstream call volume.

use chrono::NaiveDate;
use serde_json::Value;

use crate::media::MediaType;
use crate::snapshot::{
    DerivedFields, MOVIE_FINAL_STATUSES, MOVIE_PRE_RELEASE_STATUSES, TV_FINAL_STATUSES,
};

pub const SIX_HOURS_SECS: i64 = 6 * 60 * 60;
pub const ONE_DAY_SECS: i64 = 24 * 60 * 60;
pub const ONE_WEEK_SECS: i64 = 7 * 24 * 60 * 60;

/// Compute the TTL for a freshly fetched snapshot.
pub fn tracking_ttl_seconds(media_type: MediaType, snapshot: &Value, today: NaiveDate) -> i64 {
    ttl_for_fields(media_type, &DerivedFields::extract(media_type, snapshot, today))
}

/// TTL policy over already-extracted fields.
///
/// | Media  | 7 days                    | 6 hours                                   | 24 hours  |
/// |--------|---------------------------|-------------------------------------------|-----------|
/// | movie  | status `Released`         | no release date, pre-release or no status | otherwise |
/// | tv     | status `Ended`/`Canceled` | any other status, or none                 | never     |
/// | season | binge-ready               | otherwise                                 | never     |
pub fn ttl_for_fields(media_type: MediaType, fields: &DerivedFields) -> i64 {
    let status = fields.status.as_deref();

    match media_type {
        MediaType::Movie => {
            if status.is_some_and(|s| MOVIE_FINAL_STATUSES.contains(&s)) {
                ONE_WEEK_SECS
            } else if fields.release_date.is_none()
                || status.map_or(true, |s| MOVIE_PRE_RELEASE_STATUSES.contains(&s))
            {
                SIX_HOURS_SECS
            } else {
                ONE_DAY_SECS
            }
        }
        MediaType::Tv => {
            // Anything short of a final status, including none, may still change.
            if status.is_some_and(|s| TV_FINAL_STATUSES.contains(&s)) {
                ONE_WEEK_SECS
            } else {
                SIX_HOURS_SECS
            }
        }
        MediaType::Season => {
            if fields.season_last_episode_date.is_some() && fields.next_episode_date.is_none() {
                ONE_WEEK_SECS
            } else {
                SIX_HOURS_SECS
            }
        }
    }
}
