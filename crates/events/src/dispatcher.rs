//! Outbox dispatcher: one claim-send-settle pass over a channel.
//!
//! Each pass requeues stale `sending` rows, claims a batch, renders and
//! sends every claimed row, then settles it as `sent`, back to `pending`
//! with backoff, or `failed`. Delivery errors never escape a pass; only
//! storage errors do.

use std::sync::Arc;

use serde::Serialize;
use dropbinge_core::channels::Channel;
use dropbinge_core::outbox::{truncate_error, RetryDecision, RetryPolicy};
use dropbinge_db::models::outbox::ClaimedOutboxItem;
use dropbinge_db::StoreError;

use crate::delivery::{ChannelProvider, DeliveryError, OutgoingMessage};
use crate::store::OutboxStore;
use crate::template::TemplateRenderer;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No provider for the channel and not a dry run.
    #[error("No provider configured for channel {0}")]
    ChannelNotConfigured(Channel),
}

/// Knobs for one dispatch pass.
#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub batch_size: i64,
    pub stale_minutes: i64,
    pub retry: RetryPolicy,
    /// Render and settle rows as sent without calling the provider.
    pub dry_run: bool,
}

/// Counts reported by [`OutboxDispatcher::dispatch_once`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub claimed: usize,
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    pub stale_requeued: u64,
}

pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    renderer: TemplateRenderer,
}

impl OutboxDispatcher {
    pub fn new(store: Arc<dyn OutboxStore>, renderer: TemplateRenderer) -> Self {
        Self { store, renderer }
    }

    /// Run one pass over `channel`.
    ///
    /// `provider` may be `None` only for dry runs.
    pub async fn dispatch_once(
        &self,
        channel: Channel,
        provider: Option<&dyn ChannelProvider>,
        options: &DispatchOptions,
    ) -> Result<DispatchSummary, DispatchError> {
        if provider.is_none() && !options.dry_run {
            return Err(DispatchError::ChannelNotConfigured(channel));
        }

        let stale_requeued = self.store.requeue_stale(channel, options.stale_minutes).await?;
        if stale_requeued > 0 {
            tracing::warn!(%channel, stale_requeued, "Requeued stale sending rows");
        }

        let claimed = self.store.claim_batch(channel, options.batch_size).await?;
        let mut summary = DispatchSummary {
            claimed: claimed.len(),
            stale_requeued,
            ..Default::default()
        };

        for item in &claimed {
            match self.deliver(channel, item, provider, options.dry_run).await {
                Ok(()) => {
                    if !self.store.mark_sent(item.id).await? {
                        tracing::warn!(
                            outbox_id = item.id,
                            "Outbox row left sending before it was marked sent",
                        );
                    }
                    summary.sent += 1;
                }
                Err(e) => {
                    let error = truncate_error(&e.to_string());
                    match options.retry.decide(item.attempt_count) {
                        RetryDecision::Retry { delay_secs } => {
                            tracing::warn!(
                                outbox_id = item.id,
                                attempt_count = item.attempt_count,
                                delay_secs,
                                error = %e,
                                "Delivery failed, retry scheduled"
                            );
                            self.store.schedule_retry(item.id, &error, delay_secs).await?;
                            summary.retried += 1;
                        }
                        RetryDecision::GiveUp => {
                            tracing::warn!(
                                outbox_id = item.id,
                                attempt_count = item.attempt_count,
                                error = %e,
                                "Delivery failed, giving up"
                            );
                            self.store.mark_failed(item.id, &error).await?;
                            summary.failed += 1;
                        }
                    }
                }
            }
        }

        if summary.claimed > 0 || stale_requeued > 0 {
            tracing::info!(
                %channel,
                claimed = summary.claimed,
                sent = summary.sent,
                retried = summary.retried,
                failed = summary.failed,
                stale_requeued,
                dry_run = options.dry_run,
                "Dispatch pass complete"
            );
        }
        Ok(summary)
    }

    async fn deliver(
        &self,
        channel: Channel,
        item: &ClaimedOutboxItem,
        provider: Option<&dyn ChannelProvider>,
        dry_run: bool,
    ) -> Result<(), DeliveryError> {
        let rendered = self
            .renderer
            .render_value(&item.payload)
            .map_err(|e| DeliveryError::Build(format!("invalid outbox payload: {e}")))?;

        let provider = match provider {
            Some(provider) if !dry_run => provider,
            _ => {
                tracing::debug!(
                    outbox_id = item.id,
                    subject = %rendered.subject,
                    "Dry run, not sending",
                );
                return Ok(());
            }
        };

        let to = item
            .to_address
            .clone()
            .filter(|to| !to.trim().is_empty())
            .ok_or(DeliveryError::NoRecipient(channel))?;

        let message = OutgoingMessage {
            to,
            subject: rendered.subject,
            text: rendered.text,
            html: match channel {
                Channel::Email => Some(rendered.html),
                Channel::Whatsapp => None,
            },
            reply_to: None,
        };
        provider.send(&message).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use serde_json::json;
    use dropbinge_core::changes::EventType;
    use dropbinge_core::clock::{Clock, FixedClock};
    use dropbinge_core::outbox::OutboxStatus;

    use super::*;
    use crate::store::memory::MemoryOutboxStore;
    use crate::store::{NewDelivery, NewEvent};

    /// Records sends; fails the first `fail_first` calls.
    #[derive(Default)]
    struct ScriptedProvider {
        fail_first: usize,
        calls: Mutex<usize>,
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    impl ScriptedProvider {
        fn failing(fail_first: usize) -> Self {
            Self {
                fail_first,
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<OutgoingMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelProvider for ScriptedProvider {
        fn channel(&self) -> Channel {
            Channel::Email
        }

        async fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.fail_first {
                return Err(DeliveryError::Build("SMTP failure".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn options(batch_size: i64, max_attempts: i32) -> DispatchOptions {
        DispatchOptions {
            batch_size,
            stale_minutes: 15,
            retry: RetryPolicy {
                max_attempts,
                backoff_base_secs: 60,
                backoff_max_secs: 3600,
            },
            dry_run: false,
        }
    }

    struct Fixture {
        clock: FixedClock,
        store: Arc<MemoryOutboxStore>,
        dispatcher: OutboxDispatcher,
    }

    /// `n` pending email rows for user 1, created one second apart.
    fn fixture(n: usize) -> Fixture {
        let clock = FixedClock::at_date(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap());
        let store = Arc::new(MemoryOutboxStore::new(Arc::new(clock.clone())));
        store.register_contact(1, Some("viewer@example.com"), Some("+15550100"));
        for i in 0..n {
            clock.advance(Duration::seconds(1));
            store
                .record_events(&[NewEvent {
                    user_id: 1,
                    follow_id: 10,
                    event_type: EventType::DateSet,
                    event_payload: json!({"to": "2030-01-01"}),
                    deliveries: vec![NewDelivery {
                        channel: Channel::Email,
                        payload: json!({
                            "event_type": "date_set",
                            "to": "2030-01-01",
                            "event_payload": {"to": "2030-01-01"},
                            "target_type": "movie",
                            "external_id": 555 + i as i64,
                            "season_number": null,
                            "title": format!("Movie {i}")
                        }),
                    }],
                }])
                .unwrap();
        }
        let dispatcher = OutboxDispatcher::new(store.clone(), TemplateRenderer::default());
        Fixture {
            clock,
            store,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn failure_at_max_attempts_fails_row_and_leaves_rest_pending() {
        let fx = fixture(2);
        let provider = ScriptedProvider::failing(1);

        let summary = fx
            .dispatcher
            .dispatch_once(Channel::Email, Some(&provider), &options(1, 1))
            .await
            .unwrap();
        assert_eq!(
            summary,
            DispatchSummary {
                claimed: 1,
                failed: 1,
                ..Default::default()
            }
        );

        let first = fx.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(first.status(), Some(OutboxStatus::Failed));
        assert!(first.next_attempt_at.is_none());
        assert_eq!(first.last_error.as_deref(), Some("Message build error: SMTP failure"));

        let second = fx.store.find_by_id(2).await.unwrap().unwrap();
        assert_eq!(second.status(), Some(OutboxStatus::Pending));
        assert_eq!(second.attempt_count, 0);
    }

    #[tokio::test]
    async fn success_marks_sent_with_rendered_email() {
        let fx = fixture(1);
        let provider = ScriptedProvider::default();

        let summary = fx
            .dispatcher
            .dispatch_once(Channel::Email, Some(&provider), &options(10, 5))
            .await
            .unwrap();
        assert_eq!(summary.sent, 1);

        let sent = provider.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "viewer@example.com");
        assert_eq!(sent[0].subject, "[DropBinge] DROP \u{2014} Movie 0 \u{2014} Date set");
        assert!(sent[0].html.is_some());

        let row = fx.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(row.status(), Some(OutboxStatus::Sent));
        assert!(row.locked_at.is_none());
    }

    #[tokio::test]
    async fn retries_back_off_exponentially() {
        let fx = fixture(1);
        let provider = ScriptedProvider::failing(usize::MAX);
        let opts = options(10, 5);

        let start = fx.clock.now();
        let summary = fx
            .dispatcher
            .dispatch_once(Channel::Email, Some(&provider), &opts)
            .await
            .unwrap();
        assert_eq!(summary.retried, 1);
        let row = fx.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(row.next_attempt_at, Some(start + Duration::seconds(60)));

        // Not due yet.
        let summary = fx
            .dispatcher
            .dispatch_once(Channel::Email, Some(&provider), &opts)
            .await
            .unwrap();
        assert_eq!(summary.claimed, 0);

        fx.clock.advance(Duration::seconds(60));
        fx.dispatcher.dispatch_once(Channel::Email, Some(&provider), &opts).await.unwrap();
        fx.clock.advance(Duration::seconds(120));
        let third_attempt_at = fx.clock.now();
        fx.dispatcher.dispatch_once(Channel::Email, Some(&provider), &opts).await.unwrap();

        let row = fx.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(row.attempt_count, 3);
        assert_eq!(row.next_attempt_at, Some(third_attempt_at + Duration::seconds(240)));
        assert_eq!(row.status(), Some(OutboxStatus::Pending));
    }

    #[tokio::test]
    async fn dry_run_marks_sent_without_provider() {
        let fx = fixture(2);
        let opts = DispatchOptions {
            dry_run: true,
            ..options(10, 5)
        };
        let summary = fx.dispatcher.dispatch_once(Channel::Email, None, &opts).await.unwrap();
        assert_eq!(summary.claimed, 2);
        assert_eq!(summary.sent, 2);
    }

    #[tokio::test]
    async fn missing_provider_is_an_error_outside_dry_run() {
        let fx = fixture(1);
        let result = fx.dispatcher.dispatch_once(Channel::Whatsapp, None, &options(10, 5)).await;
        assert_matches!(result, Err(DispatchError::ChannelNotConfigured(Channel::Whatsapp)));
        assert_eq!(fx.store.find_by_id(1).await.unwrap().unwrap().attempt_count, 0);
    }

    #[tokio::test]
    async fn missing_recipient_schedules_retry() {
        let fx = fixture(1);
        fx.store.register_contact(1, None, None);
        let provider = ScriptedProvider::default();

        let summary = fx
            .dispatcher
            .dispatch_once(Channel::Email, Some(&provider), &options(10, 5))
            .await
            .unwrap();
        assert_eq!(summary.retried, 1);
        assert!(provider.sent().is_empty());
        let row = fx.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(row.last_error.as_deref(), Some("No recipient address for channel email"));
    }

    #[tokio::test]
    async fn stale_sending_rows_are_reclaimed() {
        let fx = fixture(1);
        // A crashed worker claimed the row and never settled it.
        fx.store.claim_batch(Channel::Email, 10).await.unwrap();
        fx.clock.advance(Duration::minutes(16));

        let provider = ScriptedProvider::default();
        let summary = fx
            .dispatcher
            .dispatch_once(Channel::Email, Some(&provider), &options(10, 5))
            .await
            .unwrap();
        assert_eq!(summary.stale_requeued, 1);
        assert_eq!(summary.sent, 1);
        let row = fx.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(row.attempt_count, 2);
    }
}
