//! Fakes shared by the unit tests of this crate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dropbinge_core::clock::FixedClock;
use dropbinge_core::media::{FollowTarget, TrackedKey};
use dropbinge_core::preferences::{FollowPreferences, TrackedFollow};
use dropbinge_events::MemoryOutboxStore;
use serde_json::Value;

use crate::cache::TrackingCache;
use crate::detector::ChangeDetector;
use crate::error::SourceError;
use crate::source::SourceProvider;
use crate::store::memory::MemoryCacheStore;

/// Source that serves whatever document was last set for a key.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    documents: Mutex<HashMap<TrackedKey, Value>>,
    failing: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn set(&self, key: TrackedKey, document: Value) {
        self.documents.lock().unwrap().insert(key, document);
    }

    pub fn fail(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for ScriptedSource {
    async fn fetch_detail(&self, key: &TrackedKey) -> Result<Value, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.failing.lock().unwrap() {
            return Err(SourceError::Api {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.documents
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SourceError::Api {
                status: 404,
                body: format!("{key} not found"),
            })
    }
}

/// Detector wired to in-memory stores and a fixed clock.
pub struct Harness {
    pub clock: FixedClock,
    pub source: Arc<ScriptedSource>,
    pub outbox: Arc<MemoryOutboxStore>,
    pub store: Arc<MemoryCacheStore>,
    pub detector: Arc<ChangeDetector>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        let source = Arc::new(ScriptedSource::default());
        let outbox = Arc::new(MemoryOutboxStore::new(Arc::new(clock.clone())));
        let store = Arc::new(MemoryCacheStore::new(Arc::clone(&outbox)));
        let cache = TrackingCache::new(store.clone(), Arc::new(clock.clone()));
        let detector = Arc::new(ChangeDetector::new(
            cache,
            source.clone(),
            Arc::new(clock.clone()),
        ));
        Self {
            clock,
            source,
            outbox,
            store,
            detector,
        }
    }

    /// A second detector over the same stores with its own key locks, as a
    /// separate worker process would have.
    pub fn peer(&self) -> ChangeDetector {
        let cache = TrackingCache::new(self.store.clone(), Arc::new(self.clock.clone()));
        ChangeDetector::new(cache, self.source.clone(), Arc::new(self.clock.clone()))
    }
}

pub fn follow(id: i64, user_id: i64, external_id: i64, target: FollowTarget) -> TrackedFollow {
    TrackedFollow {
        id,
        user_id,
        external_id,
        target,
        preferences: FollowPreferences::default(),
    }
}
