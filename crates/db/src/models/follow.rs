//! Follows joined with their notification preferences.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use dropbinge_core::error::CoreError;
use dropbinge_core::media::FollowTarget;
use dropbinge_core::preferences::{FollowPreferences, TrackedFollow};
use dropbinge_core::types::{DbId, ExternalId, SeasonNumber, Timestamp};

/// A `follows` row joined with its `follow_prefs` row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FollowWithPrefs {
    pub id: DbId,
    pub user_id: DbId,
    pub target_type: String,
    pub external_id: ExternalId,
    pub season_number: Option<SeasonNumber>,
    pub notify_date_changes: bool,
    pub notify_status_milestones: bool,
    pub notify_season_binge_ready: bool,
    pub notify_episode_drops: bool,
    pub notify_full_run_concluded: bool,
    pub channel_email: bool,
    pub channel_whatsapp: bool,
    pub frequency: String,
    pub created_at: Timestamp,
}

impl FollowWithPrefs {
    pub fn preferences(&self) -> FollowPreferences {
        FollowPreferences {
            notify_date_changes: self.notify_date_changes,
            notify_status_milestones: self.notify_status_milestones,
            notify_season_binge_ready: self.notify_season_binge_ready,
            notify_episode_drops: self.notify_episode_drops,
            notify_full_run_concluded: self.notify_full_run_concluded,
            channel_email: self.channel_email,
            channel_whatsapp: self.channel_whatsapp,
            frequency: self.frequency.clone(),
        }
    }

    /// Convert into the domain follow. Fails on an unknown `target_type`.
    pub fn into_tracked(self) -> Result<TrackedFollow, CoreError> {
        let target = FollowTarget::from_parts(&self.target_type, self.season_number)?;
        let preferences = self.preferences();
        Ok(TrackedFollow {
            id: self.id,
            user_id: self.user_id,
            external_id: self.external_id,
            target,
            preferences,
        })
    }
}

/// DTO for creating a follow. Preferences default when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFollow {
    pub user_id: DbId,
    pub target_type: String,
    pub external_id: ExternalId,
    pub season_number: Option<SeasonNumber>,
    pub preferences: Option<FollowPreferences>,
}
