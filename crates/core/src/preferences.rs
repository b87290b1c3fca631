//! Follow preferences and the resolved follow handed to the refresh engine.

use serde::{Deserialize, Serialize};

use crate::channels::Channel;
use crate::media::{FollowTarget, TrackedKey};
use crate::types::{DbId, ExternalId};

/// Default notification frequency for new follows.
pub const DEFAULT_FREQUENCY: &str = "important_only";

/// Per-follow notification settings (`follow_prefs` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowPreferences {
    pub notify_date_changes: bool,
    pub notify_status_milestones: bool,
    pub notify_season_binge_ready: bool,
    /// Stored and surfaced, but no rule emits episode drops yet.
    pub notify_episode_drops: bool,
    pub notify_full_run_concluded: bool,
    pub channel_email: bool,
    pub channel_whatsapp: bool,
    pub frequency: String,
}

impl Default for FollowPreferences {
    fn default() -> Self {
        Self {
            notify_date_changes: true,
            notify_status_milestones: false,
            notify_season_binge_ready: true,
            notify_episode_drops: false,
            notify_full_run_concluded: true,
            channel_email: true,
            channel_whatsapp: false,
            frequency: DEFAULT_FREQUENCY.to_string(),
        }
    }
}

impl FollowPreferences {
    /// Channels that receive one outbox row per emitted event, in a stable
    /// order (email first).
    pub fn enabled_channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|channel| match channel {
                Channel::Email => self.channel_email,
                Channel::Whatsapp => self.channel_whatsapp,
            })
            .collect()
    }
}

/// A follow joined with its preferences, ready to be refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedFollow {
    pub id: DbId,
    pub user_id: DbId,
    pub external_id: ExternalId,
    pub target: FollowTarget,
    pub preferences: FollowPreferences,
}

impl TrackedFollow {
    pub fn tracked_key(&self) -> TrackedKey {
        TrackedKey::for_target(self.target, self.external_id)
    }
}
