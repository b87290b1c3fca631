//! Media kinds, follow targets and the tracked-entity key.
//!
//! A [`FollowTarget`] is what a user subscribes to; a [`TrackedKey`] is the
//! upstream resource that backs it. The mapping between the two is fixed:
//!
//! | Follow target        | Media type | Season      |
//! |----------------------|------------|-------------|
//! | `movie`              | `movie`    | none        |
//! | `tv_full`            | `tv`       | none        |
//! | `tv_season` (n)      | `season`   | `Some(n)`   |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{ExternalId, SeasonNumber};

// ---------------------------------------------------------------------------
// MediaType
// ---------------------------------------------------------------------------

/// Kind of upstream resource stored in the tracking cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Tv,
    Season,
}

impl MediaType {
    /// Value stored in the `tracking_cache.media_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
            MediaType::Season => "season",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "tv" => Ok(MediaType::Tv),
            "season" => Ok(MediaType::Season),
            other => Err(CoreError::UnsupportedMediaType(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FollowTarget
// ---------------------------------------------------------------------------

pub const TARGET_MOVIE: &str = "movie";
pub const TARGET_TV_FULL: &str = "tv_full";
pub const TARGET_TV_SEASON: &str = "tv_season";

/// What a follow points at. The season number only exists for seasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FollowTarget {
    Movie,
    TvFull,
    TvSeason(SeasonNumber),
}

impl FollowTarget {
    /// Build a target from the stored `(target_type, season_number)` pair.
    ///
    /// A season number on a movie or full-series follow is ignored; a
    /// season follow without one is rejected.
    pub fn from_parts(
        target_type: &str,
        season_number: Option<SeasonNumber>,
    ) -> Result<Self, CoreError> {
        match target_type {
            TARGET_MOVIE => Ok(FollowTarget::Movie),
            TARGET_TV_FULL => Ok(FollowTarget::TvFull),
            TARGET_TV_SEASON => season_number.map(FollowTarget::TvSeason).ok_or_else(|| {
                CoreError::Validation("tv_season follow requires a season_number".to_string())
            }),
            other => Err(CoreError::UnsupportedTargetType(other.to_string())),
        }
    }

    /// Value stored in the `follows.target_type` column.
    pub fn target_type(self) -> &'static str {
        match self {
            FollowTarget::Movie => TARGET_MOVIE,
            FollowTarget::TvFull => TARGET_TV_FULL,
            FollowTarget::TvSeason(_) => TARGET_TV_SEASON,
        }
    }

    pub fn media_type(self) -> MediaType {
        match self {
            FollowTarget::Movie => MediaType::Movie,
            FollowTarget::TvFull => MediaType::Tv,
            FollowTarget::TvSeason(_) => MediaType::Season,
        }
    }

    pub fn season_number(self) -> Option<SeasonNumber> {
        match self {
            FollowTarget::TvSeason(n) => Some(n),
            FollowTarget::Movie | FollowTarget::TvFull => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TrackedKey
// ---------------------------------------------------------------------------

/// Identifies one upstream resource. Primary key of the tracking cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TrackedKey {
    pub media_type: MediaType,
    pub external_id: ExternalId,
    pub season_number: Option<SeasonNumber>,
}

impl TrackedKey {
    /// The key that backs a follow of `target` on `external_id`.
    pub fn for_target(target: FollowTarget, external_id: ExternalId) -> Self {
        Self {
            media_type: target.media_type(),
            external_id,
            season_number: target.season_number(),
        }
    }
}

impl fmt::Display for TrackedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.season_number {
            Some(season) => write!(f, "{}:{}/{}", self.media_type, self.external_id, season),
            None => write!(f, "{}:{}", self.media_type, self.external_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
