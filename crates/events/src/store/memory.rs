//! In-memory outbox for tests and database-less runs.
//!
//! Mirrors the Postgres semantics: a single mutex stands in for the claim
//! transaction, time comes from the injected [`Clock`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Duration;
use dropbinge_core::channels::Channel;
use dropbinge_core::clock::Clock;
use dropbinge_core::outbox::OutboxStatus;
use dropbinge_core::types::DbId;
use dropbinge_db::models::change_event::ChangeEvent;
use dropbinge_db::models::outbox::{ClaimedOutboxItem, OutboxItem};
use dropbinge_db::StoreError;

use super::{NewEvent, OutboxStore};

const UNIQUE_EVENT_CHANNEL: &str = "uq_outbox_event_channel";

#[derive(Debug, Clone, Default)]
struct Contact {
    email: Option<String>,
    phone_number: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    next_event_id: DbId,
    next_outbox_id: DbId,
    events: Vec<ChangeEvent>,
    outbox: Vec<OutboxItem>,
    contacts: HashMap<DbId, Contact>,
}

#[derive(Debug)]
pub struct MemoryOutboxStore {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl MemoryOutboxStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the addresses returned by claims for `user_id`.
    pub fn register_contact(&self, user_id: DbId, email: Option<&str>, phone_number: Option<&str>) {
        self.state().contacts.insert(
            user_id,
            Contact {
                email: email.map(str::to_string),
                phone_number: phone_number.map(str::to_string),
            },
        );
    }

    /// Record events and their outbox rows all-or-nothing.
    pub fn record_events(&self, events: &[NewEvent]) -> Result<Vec<ChangeEvent>, StoreError> {
        for event in events {
            let mut channels: Vec<Channel> = event.deliveries.iter().map(|d| d.channel).collect();
            channels.sort_by_key(|c| c.as_str());
            channels.dedup();
            if channels.len() != event.deliveries.len() {
                return Err(StoreError::ConstraintViolation(UNIQUE_EVENT_CHANNEL.into()));
            }
        }

        let now = self.clock.now();
        let mut state = self.state();
        let mut inserted = Vec::with_capacity(events.len());
        for event in events {
            state.next_event_id += 1;
            let row = ChangeEvent {
                id: state.next_event_id,
                user_id: event.user_id,
                follow_id: event.follow_id,
                event_type: event.event_type.as_str().to_string(),
                event_payload: event.event_payload.clone(),
                created_at: now,
            };
            for delivery in &event.deliveries {
                state.next_outbox_id += 1;
                let item = pending_row(
                    state.next_outbox_id,
                    &row,
                    delivery.channel.as_str(),
                    delivery.payload.clone(),
                    now,
                );
                state.outbox.push(item);
            }
            state.events.push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    /// Add one more outbox row for an existing event.
    #[cfg(test)]
    fn insert_outbox(
        &self,
        event: &ChangeEvent,
        channel: Channel,
        payload: serde_json::Value,
    ) -> Result<DbId, StoreError> {
        let now = self.clock.now();
        let mut state = self.state();
        let taken = state
            .outbox
            .iter()
            .any(|row| row.change_event_id == event.id && row.channel == channel.as_str());
        if taken {
            return Err(StoreError::ConstraintViolation(UNIQUE_EVENT_CHANNEL.into()));
        }
        state.next_outbox_id += 1;
        let id = state.next_outbox_id;
        state.outbox.push(pending_row(id, event, channel.as_str(), payload, now));
        Ok(id)
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.state().events.clone()
    }

    pub fn outbox_rows(&self) -> Vec<OutboxItem> {
        self.state().outbox.clone()
    }

    fn transition(
        &self,
        id: DbId,
        to: OutboxStatus,
        apply: impl FnOnce(&mut OutboxItem),
    ) -> bool {
        let mut state = self.state();
        let Some(row) = state.outbox.iter_mut().find(|row| row.id == id) else {
            return false;
        };
        let sending = row.status() == Some(OutboxStatus::Sending);
        if !sending || !OutboxStatus::Sending.can_transition(to) {
            return false;
        }
        row.status = to.as_str().to_string();
        row.locked_at = None;
        apply(row);
        true
    }
}

fn pending_row(
    id: DbId,
    event: &ChangeEvent,
    channel: &str,
    payload: serde_json::Value,
    now: dropbinge_core::types::Timestamp,
) -> OutboxItem {
    OutboxItem {
        id,
        user_id: event.user_id,
        follow_id: event.follow_id,
        change_event_id: event.id,
        channel: channel.to_string(),
        payload,
        status: OutboxStatus::Pending.as_str().to_string(),
        attempt_count: 0,
        last_attempt_at: None,
        last_error: None,
        locked_at: None,
        next_attempt_at: None,
        created_at: now,
        sent_at: None,
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn requeue_stale(&self, channel: Channel, stale_minutes: i64) -> Result<u64, StoreError> {
        let cutoff = self.clock.now() - Duration::minutes(stale_minutes);
        let mut state = self.state();
        let mut requeued = 0;
        for row in state.outbox.iter_mut().filter(|row| {
            row.channel == channel.as_str()
                && row.status() == Some(OutboxStatus::Sending)
                && row.locked_at.is_some_and(|locked_at| locked_at < cutoff)
        }) {
            row.status = OutboxStatus::Pending.as_str().to_string();
            row.locked_at = None;
            requeued += 1;
        }
        Ok(requeued)
    }

    async fn claim_batch(
        &self,
        channel: Channel,
        batch_size: i64,
    ) -> Result<Vec<ClaimedOutboxItem>, StoreError> {
        let now = self.clock.now();
        let limit = usize::try_from(batch_size).unwrap_or(0);
        let mut state = self.state();

        let mut due: Vec<usize> = state
            .outbox
            .iter()
            .enumerate()
            .filter(|(_, row)| {
                row.channel == channel.as_str()
                    && row.status() == Some(OutboxStatus::Pending)
                    && row.next_attempt_at.map_or(true, |at| at <= now)
            })
            .map(|(idx, _)| idx)
            .collect();
        due.sort_by_key(|&idx| (state.outbox[idx].created_at, state.outbox[idx].id));
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for idx in due {
            let contact = state
                .contacts
                .get(&state.outbox[idx].user_id)
                .cloned()
                .unwrap_or_default();
            let row = &mut state.outbox[idx];
            row.status = OutboxStatus::Sending.as_str().to_string();
            row.locked_at = Some(now);
            row.last_attempt_at = Some(now);
            row.attempt_count += 1;

            let to_address = match channel {
                Channel::Email => contact.email,
                Channel::Whatsapp => contact.phone_number,
            };
            claimed.push(ClaimedOutboxItem {
                id: row.id,
                user_id: row.user_id,
                follow_id: row.follow_id,
                change_event_id: row.change_event_id,
                channel: row.channel.clone(),
                payload: row.payload.clone(),
                attempt_count: row.attempt_count,
                created_at: row.created_at,
                to_address,
            });
        }
        Ok(claimed)
    }

    async fn mark_sent(&self, id: DbId) -> Result<bool, StoreError> {
        let now = self.clock.now();
        Ok(self.transition(id, OutboxStatus::Sent, |row| {
            row.sent_at = Some(now);
            row.last_error = None;
        }))
    }

    async fn schedule_retry(
        &self,
        id: DbId,
        error: &str,
        delay_secs: i64,
    ) -> Result<bool, StoreError> {
        let due = self.clock.now() + Duration::seconds(delay_secs);
        Ok(self.transition(id, OutboxStatus::Pending, |row| {
            row.last_error = Some(error.to_string());
            row.next_attempt_at = Some(due);
        }))
    }

    async fn mark_failed(&self, id: DbId, error: &str) -> Result<bool, StoreError> {
        Ok(self.transition(id, OutboxStatus::Failed, |row| {
            row.last_error = Some(error.to_string());
            row.next_attempt_at = None;
        }))
    }

    async fn count_all(&self) -> Result<i64, StoreError> {
        Ok(self.state().outbox.len() as i64)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<OutboxItem>, StoreError> {
        Ok(self.state().outbox.iter().find(|row| row.id == id).cloned())
    }

    async fn list_for_event(&self, change_event_id: DbId) -> Result<Vec<OutboxItem>, StoreError> {
        let mut rows: Vec<OutboxItem> = self
            .state()
            .outbox
            .iter()
            .filter(|row| row.change_event_id == change_event_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.channel.cmp(&b.channel));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert_matches::assert_matches;
    use chrono::NaiveDate;
    use serde_json::json;
    use dropbinge_core::changes::EventType;
    use dropbinge_core::clock::FixedClock;

    use super::*;
    use crate::store::NewDelivery;

    fn store() -> (FixedClock, MemoryOutboxStore) {
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
        let store = MemoryOutboxStore::new(Arc::new(clock.clone()));
        store.register_contact(1, Some("viewer@example.com"), None);
        (clock, store)
    }

    fn event(channels: &[Channel]) -> NewEvent {
        NewEvent {
            user_id: 1,
            follow_id: 10,
            event_type: EventType::DateSet,
            event_payload: json!({"to": "2030-01-01"}),
            deliveries: channels
                .iter()
                .map(|&channel| NewDelivery {
                    channel,
                    payload: json!({"event_type": "date_set"}),
                })
                .collect(),
        }
    }

    /// Record `n` single-channel email events one second apart.
    fn seed(clock: &FixedClock, store: &MemoryOutboxStore, n: usize) -> Vec<ChangeEvent> {
        (0..n)
            .map(|_| {
                clock.advance(Duration::seconds(1));
                store.record_events(&[event(&[Channel::Email])]).unwrap().remove(0)
            })
            .collect()
    }

    #[tokio::test]
    async fn duplicate_event_channel_is_rejected() {
        let (_clock, store) = store();
        let recorded = store.record_events(&[event(&[Channel::Email])]).unwrap();

        let err = store
            .insert_outbox(&recorded[0], Channel::Email, json!({}))
            .unwrap_err();
        assert_matches!(
            err,
            StoreError::ConstraintViolation(name) if name == "uq_outbox_event_channel"
        );

        store.insert_outbox(&recorded[0], Channel::Whatsapp, json!({})).unwrap();
        assert_eq!(store.list_for_event(recorded[0].id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_channels_in_one_event_write_nothing() {
        let (_clock, store) = store();
        let err = store
            .record_events(&[event(&[Channel::Email]), event(&[Channel::Email, Channel::Email])])
            .unwrap_err();
        assert_matches!(err, StoreError::ConstraintViolation(_));
        assert!(store.events().is_empty());
        assert_eq!(store.count_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sequential_claims_are_disjoint_and_oldest_first() {
        let (clock, store) = store();
        seed(&clock, &store, 5);

        let first = store.claim_batch(Channel::Email, 2).await.unwrap();
        let second = store.claim_batch(Channel::Email, 2).await.unwrap();

        let first_ids: Vec<DbId> = first.iter().map(|c| c.id).collect();
        let second_ids: Vec<DbId> = second.iter().map(|c| c.id).collect();
        assert_eq!(first_ids, vec![1, 2]);
        assert_eq!(second_ids, vec![3, 4]);

        let union: HashSet<DbId> = first_ids.into_iter().chain(second_ids).collect();
        assert_eq!(union.len(), 4);
        assert_eq!(first[0].to_address.as_deref(), Some("viewer@example.com"));
        assert_eq!(first[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn retry_waits_for_next_attempt() {
        let (clock, store) = store();
        seed(&clock, &store, 1);
        let claimed = store.claim_batch(Channel::Email, 10).await.unwrap();
        assert!(store.schedule_retry(claimed[0].id, "boom", 60).await.unwrap());

        assert!(store.claim_batch(Channel::Email, 10).await.unwrap().is_empty());
        clock.advance(Duration::seconds(60));
        let again = store.claim_batch(Channel::Email, 10).await.unwrap();
        assert_eq!(again[0].attempt_count, 2);
    }

    #[tokio::test]
    async fn stale_locks_are_requeued() {
        let (clock, store) = store();
        seed(&clock, &store, 1);
        store.claim_batch(Channel::Email, 10).await.unwrap();

        clock.advance(Duration::minutes(10));
        assert_eq!(store.requeue_stale(Channel::Email, 15).await.unwrap(), 0);
        clock.advance(Duration::minutes(6));
        assert_eq!(store.requeue_stale(Channel::Email, 15).await.unwrap(), 1);

        let row = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(row.status(), Some(OutboxStatus::Pending));
        assert!(row.locked_at.is_none());
    }

    #[tokio::test]
    async fn terminal_rows_do_not_transition() {
        let (clock, store) = store();
        seed(&clock, &store, 1);
        store.claim_batch(Channel::Email, 10).await.unwrap();
        assert!(store.mark_sent(1).await.unwrap());
        assert!(!store.mark_failed(1, "late").await.unwrap());
        assert!(!store.schedule_retry(1, "late", 5).await.unwrap());

        let row = store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(row.status(), Some(OutboxStatus::Sent));
        assert!(row.sent_at.is_some());
    }
}
