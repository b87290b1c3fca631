//! Change event rows: the durable record of a detected change.

use serde::Serialize;
use sqlx::FromRow;
use dropbinge_core::types::{DbId, Timestamp};

/// A row from the `change_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChangeEvent {
    pub id: DbId,
    pub user_id: DbId,
    pub follow_id: DbId,
    pub event_type: String,
    pub event_payload: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for inserting a change event.
#[derive(Debug, Clone)]
pub struct NewChangeEvent<'a> {
    pub user_id: DbId,
    pub follow_id: DbId,
    pub event_type: &'a str,
    pub event_payload: &'a serde_json::Value,
}
