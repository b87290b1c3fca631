//! Refresh engine: fetch a tracked entity, diff it against the stored
//! baseline and record the resulting change events.
//!
//! A refresh either serves a fresh cache entry (no fetch, no events) or
//! fetches, diffs, and commits the cache write together with every change
//! event and its outbox rows. Refreshes of one key are serialized in
//! process by [`KeyedLocks`]; across processes the store rejects commits
//! made against a baseline that moved, and the diff is redone.

use std::sync::Arc;

use dropbinge_core::changes::{detect_changes, DetectedChange, EventType};
use dropbinge_core::clock::Clock;
use dropbinge_core::preferences::TrackedFollow;
use dropbinge_core::snapshot::snapshot_title;
use dropbinge_db::StoreError;
use dropbinge_events::payload::build_outbox_payload;
use dropbinge_events::{NewDelivery, NewEvent};
use serde_json::Value;

use crate::cache::TrackingCache;
use crate::error::{RefreshError, SourceError};
use crate::locks::KeyedLocks;
use crate::source::SourceProvider;
use crate::store::RefreshCommit;

/// Commit attempts before a moving baseline is reported as an error.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

pub struct ChangeDetector {
    cache: TrackingCache,
    source: Arc<dyn SourceProvider>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
}

impl ChangeDetector {
    pub fn new(
        cache: TrackingCache,
        source: Arc<dyn SourceProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            source,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    pub fn cache(&self) -> &TrackingCache {
        &self.cache
    }

    /// Refresh one follow. Returns the emitted event types in order.
    ///
    /// Without `force_fetch`, a fresh cache entry short-circuits with no
    /// events. Upstream failures abort before anything is written.
    pub async fn refresh(
        &self,
        follow: &TrackedFollow,
        force_fetch: bool,
    ) -> Result<Vec<EventType>, RefreshError> {
        let key = follow.tracked_key();
        let _guard = self.locks.acquire(key).await;

        let now = self.clock.now();
        let today = now.date_naive();

        if !force_fetch && self.cache.get_at(&key, now).await?.is_some() {
            tracing::debug!(follow_id = follow.id, %key, "Tracking cache hit, skipping fetch");
            return Ok(Vec::new());
        }

        let mut baseline = self.cache.get_stored(&key).await?;

        let snapshot = self
            .source
            .fetch_detail(&key)
            .await
            .map_err(|source| RefreshError::UpstreamFetch { key, source })?;
        if !snapshot.is_object() {
            return Err(RefreshError::UpstreamFetch {
                key,
                source: SourceError::Malformed(format!(
                    "expected a JSON object, got {}",
                    json_kind(&snapshot)
                )),
            });
        }

        let title = snapshot_title(&snapshot);
        let write = TrackingCache::prepare_write(key, snapshot, now);

        let mut attempt = 1;
        loop {
            let changes = match &baseline {
                Some(previous) => detect_changes(
                    follow.target,
                    &previous.fields,
                    &write.fields,
                    &follow.preferences,
                    today,
                ),
                None => Vec::new(),
            };
            let events = build_events(follow, &changes, title.as_deref());

            let commit = RefreshCommit {
                write: &write,
                baseline_revision: baseline.as_ref().map(|entry| entry.revision),
                events: &events,
            };

            match self.cache.commit_refresh(&commit).await {
                Ok(recorded) => {
                    for event in &recorded {
                        tracing::info!(
                            event_id = event.id,
                            follow_id = follow.id,
                            user_id = follow.user_id,
                            event_type = %event.event_type,
                            %key,
                            "Change event recorded",
                        );
                    }
                    return Ok(events.iter().map(|event| event.event_type).collect());
                }
                Err(StoreError::StaleBaseline(_)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::info!(
                        follow_id = follow.id,
                        %key,
                        attempt,
                        "Tracking cache entry moved during refresh, diffing again",
                    );
                    attempt += 1;
                    baseline = self.cache.get_stored(&key).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Refresh every follow of one user in order, stopping at the first
    /// error. Returns the concatenated event types.
    pub async fn refresh_user(
        &self,
        follows: &[TrackedFollow],
        force_fetch: bool,
    ) -> Result<Vec<EventType>, RefreshError> {
        let mut emitted = Vec::new();
        for follow in follows {
            emitted.extend(self.refresh(follow, force_fetch).await?);
        }
        Ok(emitted)
    }
}

/// One [`NewEvent`] per change, each fanned out to the enabled channels.
fn build_events(
    follow: &TrackedFollow,
    changes: &[DetectedChange],
    title: Option<&str>,
) -> Vec<NewEvent> {
    let channels = follow.preferences.enabled_channels();
    changes
        .iter()
        .map(|change| {
            let payload = build_outbox_payload(change, follow.target, follow.external_id, title);
            NewEvent {
                user_id: follow.user_id,
                follow_id: follow.id,
                event_type: change.event_type,
                event_payload: change.payload.clone(),
                deliveries: channels
                    .iter()
                    .map(|&channel| NewDelivery {
                        channel,
                        payload: payload.clone(),
                    })
                    .collect(),
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
