//! Notification outbox rows.

use serde::Serialize;
use sqlx::FromRow;
use dropbinge_core::outbox::OutboxStatus;
use dropbinge_core::types::{DbId, Timestamp};

/// A row from the `notification_outbox` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OutboxItem {
    pub id: DbId,
    pub user_id: DbId,
    pub follow_id: DbId,
    pub change_event_id: DbId,
    pub channel: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempt_count: i32,
    pub last_attempt_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub locked_at: Option<Timestamp>,
    pub next_attempt_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub sent_at: Option<Timestamp>,
}

impl OutboxItem {
    /// Parsed status. The column is constrained, so `None` means the
    /// schema and this enum disagree.
    pub fn status(&self) -> Option<OutboxStatus> {
        self.status.parse().ok()
    }
}

/// A row just moved to `sending`, joined with the recipient address for
/// its channel.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClaimedOutboxItem {
    pub id: DbId,
    pub user_id: DbId,
    pub follow_id: DbId,
    pub change_event_id: DbId,
    pub channel: String,
    pub payload: serde_json::Value,
    /// Already incremented for this attempt.
    pub attempt_count: i32,
    pub created_at: Timestamp,
    /// `users.email` or `users.phone_number`, depending on the channel.
    pub to_address: Option<String>,
}

/// DTO for inserting an outbox row.
#[derive(Debug, Clone)]
pub struct NewOutboxItem<'a> {
    pub user_id: DbId,
    pub follow_id: DbId,
    pub change_event_id: DbId,
    pub channel: &'a str,
    pub payload: &'a serde_json::Value,
}
