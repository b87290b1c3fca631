//! The JSON document stored in `notification_outbox.payload`.
//!
//! Event fields (`field`, `from`, `to`, `last_episode_air_date`) are copied
//! to the top level and also kept nested under `event_payload`, next to the
//! metadata the renderer needs to describe the title.

use serde::Deserialize;
use serde_json::{Map, Value};
use dropbinge_core::changes::DetectedChange;
use dropbinge_core::media::FollowTarget;
use dropbinge_core::types::{ExternalId, SeasonNumber};

/// Build the payload for one outbox row.
pub fn build_outbox_payload(
    change: &DetectedChange,
    target: FollowTarget,
    external_id: ExternalId,
    title: Option<&str>,
) -> Value {
    let mut map = Map::new();
    if let Value::Object(fields) = &change.payload {
        map.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    map.insert("event_type".into(), change.event_type.as_str().into());
    map.insert("event_payload".into(), change.payload.clone());
    map.insert("target_type".into(), target.target_type().into());
    map.insert("external_id".into(), external_id.into());
    map.insert("season_number".into(), target.season_number().into());
    map.insert("title".into(), title.into());
    Value::Object(map)
}

/// Parsed view of an outbox payload. Every field is optional so rows
/// written by older code still render.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutboxPayload {
    pub event_type: Option<String>,
    #[serde(default)]
    pub event_payload: Value,
    pub target_type: Option<String>,
    #[serde(alias = "tmdb_id")]
    pub external_id: Option<ExternalId>,
    pub season_number: Option<SeasonNumber>,
    pub title: Option<String>,
}

impl OutboxPayload {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// String form of an event field, `None` when missing or null.
    pub fn event_field(&self, name: &str) -> Option<String> {
        match self.event_payload.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
