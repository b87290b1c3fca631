//! Derived fields extracted from an upstream snapshot.
//!
//! The raw payload is stored as-is; the fields below are what the TTL
//! policy and the change detector actually look at. Extraction never
//! fails: missing or malformed values simply become `None`.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::media::MediaType;

/// Movie statuses after which nothing is expected to change.
pub const MOVIE_FINAL_STATUSES: [&str; 1] = ["Released"];

/// Movie statuses that mean the release is still being planned.
pub const MOVIE_PRE_RELEASE_STATUSES: [&str; 4] =
    ["Rumored", "Planned", "In Production", "Post Production"];

/// Series statuses that mean the run has concluded.
pub const TV_FINAL_STATUSES: [&str; 2] = ["Ended", "Canceled"];

// ---------------------------------------------------------------------------
// FinalState
// ---------------------------------------------------------------------------

/// Settled lifecycle state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalState {
    Released,
    Concluded,
    BingeReady,
}

impl FinalState {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalState::Released => "released",
            FinalState::Concluded => "concluded",
            FinalState::BingeReady => "binge_ready",
        }
    }
}

impl fmt::Display for FinalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FinalState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "released" => Ok(FinalState::Released),
            "concluded" => Ok(FinalState::Concluded),
            "binge_ready" => Ok(FinalState::BingeReady),
            other => Err(CoreError::Validation(format!("unknown final state '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// DerivedFields
// ---------------------------------------------------------------------------

/// Typed columns extracted from a snapshot. Which fields are populated
/// depends on the media type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedFields {
    pub status: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub first_air_date: Option<NaiveDate>,
    pub last_air_date: Option<NaiveDate>,
    pub next_air_date: Option<NaiveDate>,
    pub season_air_date: Option<NaiveDate>,
    /// Latest dated episode of a season, aired or scheduled.
    pub season_last_episode_date: Option<NaiveDate>,
    pub season_count: Option<i32>,
    pub episode_count: Option<i32>,
    /// Latest episode that has already aired.
    pub last_episode_date: Option<NaiveDate>,
    /// Earliest episode that has not aired yet.
    pub next_episode_date: Option<NaiveDate>,
    pub final_state: Option<FinalState>,
    /// Date the entity reached `final_state`.
    pub final_completed_at: Option<NaiveDate>,
}

impl DerivedFields {
    /// Extract the fields relevant to `media_type` from a raw snapshot.
    ///
    /// `today` splits season episodes into aired and upcoming.
    pub fn extract(media_type: MediaType, snapshot: &Value, today: NaiveDate) -> Self {
        let status = snapshot
            .get("status")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        match media_type {
            MediaType::Movie => {
                let release_date = parse_date(snapshot.get("release_date"));
                let released = status
                    .as_deref()
                    .is_some_and(|s| MOVIE_FINAL_STATUSES.contains(&s));
                Self {
                    status,
                    release_date,
                    final_state: released.then_some(FinalState::Released),
                    final_completed_at: if released { release_date } else { None },
                    ..Self::default()
                }
            }
            MediaType::Tv => {
                let last_air_date = parse_date(snapshot.get("last_air_date"));
                let next_air_date = nested_air_date(snapshot, "next_episode_to_air");
                let concluded = status
                    .as_deref()
                    .is_some_and(|s| TV_FINAL_STATUSES.contains(&s));
                Self {
                    status,
                    first_air_date: parse_date(snapshot.get("first_air_date")),
                    last_air_date,
                    next_air_date,
                    season_count: int_field(snapshot, "number_of_seasons"),
                    episode_count: int_field(snapshot, "number_of_episodes"),
                    last_episode_date: nested_air_date(snapshot, "last_episode_to_air"),
                    next_episode_date: next_air_date,
                    final_state: concluded.then_some(FinalState::Concluded),
                    final_completed_at: if concluded { last_air_date } else { None },
                    ..Self::default()
                }
            }
            MediaType::Season => {
                let episodes = EpisodeDates::collect(snapshot, today);
                let binge_ready = episodes.latest.is_some() && episodes.next_upcoming.is_none();
                Self {
                    status,
                    season_air_date: parse_date(snapshot.get("air_date")),
                    season_last_episode_date: episodes.latest,
                    episode_count: episodes.count,
                    last_episode_date: episodes.latest_aired,
                    next_episode_date: episodes.next_upcoming,
                    final_state: binge_ready.then_some(FinalState::BingeReady),
                    final_completed_at: if binge_ready { episodes.latest } else { None },
                    ..Self::default()
                }
            }
        }
    }

    /// Every dated episode of the season has aired on or before `today`.
    pub fn is_binge_ready(&self, today: NaiveDate) -> bool {
        self.season_last_episode_date.is_some_and(|d| d <= today)
    }

    /// The series status is one of [`TV_FINAL_STATUSES`].
    pub fn is_concluded(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| TV_FINAL_STATUSES.contains(&s))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse an upstream `YYYY-MM-DD` date. Empty strings, nulls and
/// unparseable values all yield `None`.
pub fn parse_date(value: Option<&Value>) -> Option<NaiveDate> {
    let raw = value?.as_str()?;
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Human-readable title of a snapshot (`title` for movies, `name` for
/// series and seasons).
pub fn snapshot_title(snapshot: &Value) -> Option<String> {
    ["title", "name"]
        .iter()
        .filter_map(|key| snapshot.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn nested_air_date(snapshot: &Value, key: &str) -> Option<NaiveDate> {
    parse_date(snapshot.get(key).and_then(|v| v.get("air_date")))
}

fn int_field(snapshot: &Value, key: &str) -> Option<i32> {
    snapshot
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|n| i32::try_from(n).ok())
}

/// Episode air dates of a season snapshot, split around `today`.
struct EpisodeDates {
    latest: Option<NaiveDate>,
    latest_aired: Option<NaiveDate>,
    next_upcoming: Option<NaiveDate>,
    count: Option<i32>,
}

impl EpisodeDates {
    fn collect(snapshot: &Value, today: NaiveDate) -> Self {
        let Some(episodes) = snapshot.get("episodes").and_then(Value::as_array) else {
            return Self {
                latest: None,
                latest_aired: None,
                next_upcoming: None,
                count: None,
            };
        };

        let dates: Vec<NaiveDate> = episodes
            .iter()
            .filter_map(|episode| parse_date(episode.get("air_date")))
            .collect();

        Self {
            latest: dates.iter().copied().max(),
            latest_aired: dates.iter().copied().filter(|d| *d <= today).max(),
            next_upcoming: dates.iter().copied().filter(|d| *d > today).min(),
            count: i32::try_from(episodes.len()).ok(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn parse_date_tolerates_garbage() {
        assert_eq!(parse_date(Some(&json!("2030-01-01"))), Some(date("2030-01-01")));
        assert_eq!(parse_date(Some(&json!(""))), None);
        assert_eq!(parse_date(Some(&json!("soon"))), None);
        assert_eq!(parse_date(Some(&Value::Null)), None);
        assert_eq!(parse_date(None), None);
    }

    #[test]
    fn movie_fields() {
        let snapshot = json!({"title": "Dune", "status": "Released", "release_date": "2021-10-22"});
        let fields = DerivedFields::extract(MediaType::Movie, &snapshot, date("2024-01-01"));
        assert_eq!(fields.status.as_deref(), Some("Released"));
        assert_eq!(fields.release_date, Some(date("2021-10-22")));
        assert_eq!(fields.final_state, Some(FinalState::Released));
        assert_eq!(fields.final_completed_at, Some(date("2021-10-22")));
        assert_eq!(fields.next_air_date, None);
    }

    #[test]
    fn movie_without_release_date_has_no_final_state() {
        let snapshot = json!({"title": "Untitled", "status": "Planned", "release_date": ""});
        let fields = DerivedFields::extract(MediaType::Movie, &snapshot, date("2024-01-01"));
        assert_eq!(fields.release_date, None);
        assert_eq!(fields.final_state, None);
    }

    #[test]
    fn tv_fields() {
        let snapshot = json!({
            "name": "Show",
            "status": "Ended",
            "first_air_date": "2015-01-01",
            "last_air_date": "2019-05-19",
            "number_of_seasons": 8,
            "number_of_episodes": 73,
            "last_episode_to_air": {"air_date": "2019-05-19"},
            "next_episode_to_air": null
        });
        let fields = DerivedFields::extract(MediaType::Tv, &snapshot, date("2024-01-01"));
        assert_eq!(fields.season_count, Some(8));
        assert_eq!(fields.episode_count, Some(73));
        assert_eq!(fields.next_air_date, None);
        assert_eq!(fields.last_episode_date, Some(date("2019-05-19")));
        assert!(fields.is_concluded());
        assert_eq!(fields.final_state, Some(FinalState::Concluded));
        assert_eq!(fields.final_completed_at, Some(date("2019-05-19")));
    }

    #[test]
    fn season_split_around_today() {
        let snapshot = json!({
            "air_date": "2030-01-01",
            "episodes": [
                {"air_date": "2030-01-01"},
                {"air_date": "2030-01-08"},
                {"air_date": null},
                {"air_date": "2030-01-15"}
            ]
        });
        let fields = DerivedFields::extract(MediaType::Season, &snapshot, date("2030-01-09"));
        assert_eq!(fields.season_air_date, Some(date("2030-01-01")));
        assert_eq!(fields.season_last_episode_date, Some(date("2030-01-15")));
        assert_eq!(fields.last_episode_date, Some(date("2030-01-08")));
        assert_eq!(fields.next_episode_date, Some(date("2030-01-15")));
        assert_eq!(fields.episode_count, Some(4));
        assert_eq!(fields.final_state, None);
        assert!(!fields.is_binge_ready(date("2030-01-09")));
        assert!(fields.is_binge_ready(date("2030-01-15")));
    }

    #[test]
    fn season_fully_aired_is_binge_ready() {
        let snapshot = json!({
            "episodes": [{"air_date": "2020-01-01"}, {"air_date": "2020-01-08"}]
        });
        let fields = DerivedFields::extract(MediaType::Season, &snapshot, date("2024-01-01"));
        assert_eq!(fields.final_state, Some(FinalState::BingeReady));
        assert_eq!(fields.final_completed_at, Some(date("2020-01-08")));
    }

    #[test]
    fn season_without_episodes_list() {
        let fields = DerivedFields::extract(MediaType::Season, &json!({}), date("2024-01-01"));
        assert_eq!(fields, DerivedFields::default());
    }

    #[test]
    fn title_prefers_title_then_name() {
        assert_eq!(snapshot_title(&json!({"title": "Film"})).as_deref(), Some("Film"));
        assert_eq!(snapshot_title(&json!({"name": "Series"})).as_deref(), Some("Series"));
        assert_eq!(snapshot_title(&json!({"title": ""})), None);
    }
}
