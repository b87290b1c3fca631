use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::PgPool;
use dropbinge_core::changes::EventType;
use dropbinge_core::clock::SystemClock;
use dropbinge_core::media::{MediaType, TrackedKey};
use dropbinge_db::models::follow::CreateFollow;
use dropbinge_db::models::user::CreateUser;
use dropbinge_core::preferences::FollowPreferences;
use dropbinge_db::repositories::{ChangeEventRepo, FollowRepo, UserRepo};
use dropbinge_events::{OutboxStore, PgOutboxStore};
use dropbinge_tracking::{
    BulkRefreshCoordinator, CacheStore, ChangeDetector, FollowDirectory, PgCacheStore,
    PgFollowDirectory, RefreshLimits, SourceError, SourceProvider, TrackingCache,
};

#[derive(Default)]
struct Upstream {
    documents: Mutex<HashMap<TrackedKey, Value>>,
}

impl Upstream {
    fn set(&self, key: TrackedKey, document: Value) {
        self.documents.lock().unwrap().insert(key, document);
    }
}

#[async_trait]
impl SourceProvider for Upstream {
    async fn fetch_detail(&self, key: &TrackedKey) -> Result<Value, SourceError> {
        self.documents
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or(SourceError::NotConfigured)
    }
}

fn movie_key(external_id: i64) -> TrackedKey {
    TrackedKey {
        media_type: MediaType::Movie,
        external_id,
        season_number: None,
    }
}

async fn seed_user(pool: &PgPool, email: &str, movies: &[i64]) -> i64 {
    let user = UserRepo::create(
        pool,
        &CreateUser {
            email: email.to_string(),
            phone_number: None,
            password_hash: "x".to_string(),
        },
    )
    .await
    .unwrap();
    for &external_id in movies {
        FollowRepo::create(
            pool,
            &CreateFollow {
                user_id: user.id,
                target_type: "movie".to_string(),
                external_id,
                season_number: None,
                preferences: None,
            },
        )
        .await
        .unwrap();
    }
    user.id
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_bulk_refresh_records_events_and_outbox(pool: PgPool) {
    seed_user(&pool, "a@example.com", &[555]).await;

    let upstream = Arc::new(Upstream::default());
    upstream.set(movie_key(555), json!({"title": "Arrival 2", "release_date": null}));

    let clock = Arc::new(SystemClock);
    let store = Arc::new(PgCacheStore::new(pool.clone()));
    let outbox = Arc::new(PgOutboxStore::new(pool.clone()));
    let detector = Arc::new(ChangeDetector::new(
        TrackingCache::new(store.clone(), clock.clone()),
        upstream.clone(),
        clock,
    ));
    let coordinator = BulkRefreshCoordinator::new(
        detector,
        Arc::new(PgFollowDirectory::new(pool.clone())),
        outbox.clone(),
    );

    let first = coordinator.refresh_all(RefreshLimits::default(), false).await.unwrap();
    assert_eq!(first.processed_follows, 1);
    assert_eq!(first.events_emitted, 0);
    let entry = store.get_stored(&movie_key(555)).await.unwrap().unwrap();
    assert_eq!(entry.revision, 1);

    upstream.set(movie_key(555), json!({"title": "Arrival 2", "release_date": "2030-01-01"}));
    let second = coordinator.refresh_all(RefreshLimits::default(), true).await.unwrap();
    assert_eq!(second.events_emitted, 1);
    assert_eq!(second.outbox_enqueued, 1);
    assert_eq!(outbox.count_all().await.unwrap(), 1);

    let claimed = outbox
        .claim_batch(dropbinge_core::channels::Channel::Email, 10)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].payload["event_type"], EventType::DateSet.as_str());
    assert_eq!(claimed[0].payload["to"], "2030-01-01");
    assert_eq!(claimed[0].to_address.as_deref(), Some("a@example.com"));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_refresh_limits_cap_users_and_follows_per_user(pool: PgPool) {
    let first = seed_user(&pool, "a@example.com", &[1, 2, 3]).await;
    let second = seed_user(&pool, "b@example.com", &[4, 5]).await;
    seed_user(&pool, "c@example.com", &[6]).await;

    let directory = PgFollowDirectory::new(pool.clone());
    let rows = directory
        .list_for_refresh(RefreshLimits {
            limit_users: Some(2),
            limit_follows: Some(2),
        })
        .await
        .unwrap();

    let picked: Vec<(i64, i64)> = rows.iter().map(|r| (r.user_id, r.external_id)).collect();
    assert_eq!(picked, vec![(first, 1), (first, 2), (second, 4), (second, 5)]);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires a Postgres DATABASE_URL"]
async fn test_updated_preferences_gate_events(pool: PgPool) {
    let user_id = seed_user(&pool, "a@example.com", &[555]).await;
    let follow = FollowRepo::list_for_user(&pool, user_id).await.unwrap().remove(0);
    FollowRepo::update_prefs(
        &pool,
        follow.id,
        &FollowPreferences {
            notify_date_changes: false,
            ..FollowPreferences::default()
        },
    )
    .await
    .unwrap();

    let upstream = Arc::new(Upstream::default());
    upstream.set(movie_key(555), json!({"status": "Planned"}));
    let clock = Arc::new(SystemClock);
    let detector = Arc::new(ChangeDetector::new(
        TrackingCache::new(Arc::new(PgCacheStore::new(pool.clone())), clock.clone()),
        upstream.clone(),
        clock,
    ));
    let coordinator = BulkRefreshCoordinator::new(
        detector,
        Arc::new(PgFollowDirectory::new(pool.clone())),
        Arc::new(PgOutboxStore::new(pool.clone())),
    );

    coordinator.refresh_user(user_id, true).await.unwrap();
    upstream.set(movie_key(555), json!({"status": "Planned", "release_date": "2030-01-01"}));
    let emitted = coordinator.refresh_user(user_id, true).await.unwrap();

    assert!(emitted.is_empty());
    assert!(ChangeEventRepo::list_for_follow(&pool, follow.id).await.unwrap().is_empty());
}
