//! Bulk refresh: run the change detector over many follows in one pass.
//!
//! Follows are refreshed sequentially. An upstream failure or an unknown
//! target type is logged and counted and the pass carries on; storage
//! errors abort it.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use dropbinge_core::changes::EventType;
use dropbinge_core::preferences::TrackedFollow;
use dropbinge_core::types::DbId;
use dropbinge_db::models::follow::FollowWithPrefs;
use dropbinge_db::repositories::FollowRepo;
use dropbinge_db::{DbPool, StoreError};
use dropbinge_events::OutboxStore;
use serde::Serialize;

use crate::detector::ChangeDetector;
use crate::error::RefreshError;

// ---------------------------------------------------------------------------
// Follow directory
// ---------------------------------------------------------------------------

/// Optional caps for a bulk pass. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshLimits {
    /// Only the N lowest user ids.
    pub limit_users: Option<i64>,
    /// At most N follows per user, lowest follow id first.
    pub limit_follows: Option<i64>,
}

/// Where the coordinator gets its follows from.
#[async_trait]
pub trait FollowDirectory: Send + Sync {
    /// Follows for a pass, ordered by user id then follow id.
    async fn list_for_refresh(
        &self,
        limits: RefreshLimits,
    ) -> Result<Vec<FollowWithPrefs>, StoreError>;

    async fn list_for_user(&self, user_id: DbId) -> Result<Vec<FollowWithPrefs>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgFollowDirectory {
    pool: DbPool,
}

impl PgFollowDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowDirectory for PgFollowDirectory {
    async fn list_for_refresh(
        &self,
        limits: RefreshLimits,
    ) -> Result<Vec<FollowWithPrefs>, StoreError> {
        let follows =
            FollowRepo::list_for_refresh(&self.pool, limits.limit_users, limits.limit_follows)
                .await?;
        Ok(follows)
    }

    async fn list_for_user(&self, user_id: DbId) -> Result<Vec<FollowWithPrefs>, StoreError> {
        Ok(FollowRepo::list_for_user(&self.pool, user_id).await?)
    }
}

/// Fixed follow list for tests and database-less runs. User limits apply
/// to the users that own at least one follow.
#[derive(Debug, Clone, Default)]
pub struct StaticFollowDirectory {
    follows: Vec<FollowWithPrefs>,
}

impl StaticFollowDirectory {
    pub fn new(mut follows: Vec<FollowWithPrefs>) -> Self {
        follows.sort_by_key(|f| (f.user_id, f.id));
        Self { follows }
    }
}

#[async_trait]
impl FollowDirectory for StaticFollowDirectory {
    async fn list_for_refresh(
        &self,
        limits: RefreshLimits,
    ) -> Result<Vec<FollowWithPrefs>, StoreError> {
        let users: BTreeSet<DbId> = self.follows.iter().map(|f| f.user_id).collect();
        let allowed: BTreeSet<DbId> = match limits.limit_users {
            Some(n) => users.into_iter().take(cap(n)).collect(),
            None => users,
        };

        let per_user = limits.limit_follows.map_or(usize::MAX, cap);
        let mut selected = Vec::new();
        let mut current_user = None;
        let mut taken = 0;
        for follow in self.follows.iter().filter(|f| allowed.contains(&f.user_id)) {
            if current_user != Some(follow.user_id) {
                current_user = Some(follow.user_id);
                taken = 0;
            }
            if taken < per_user {
                selected.push(follow.clone());
                taken += 1;
            }
        }
        Ok(selected)
    }

    async fn list_for_user(&self, user_id: DbId) -> Result<Vec<FollowWithPrefs>, StoreError> {
        Ok(self
            .follows
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect())
    }
}

fn cap(limit: i64) -> usize {
    usize::try_from(limit.max(0)).unwrap_or(usize::MAX)
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Counts reported by [`BulkRefreshCoordinator::refresh_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkRefreshSummary {
    pub processed_follows: usize,
    pub events_emitted: usize,
    /// Outbox row count after the pass minus before, never negative.
    pub outbox_enqueued: i64,
    pub failed: usize,
}

pub struct BulkRefreshCoordinator {
    detector: Arc<ChangeDetector>,
    directory: Arc<dyn FollowDirectory>,
    outbox: Arc<dyn OutboxStore>,
}

impl BulkRefreshCoordinator {
    pub fn new(
        detector: Arc<ChangeDetector>,
        directory: Arc<dyn FollowDirectory>,
        outbox: Arc<dyn OutboxStore>,
    ) -> Self {
        Self {
            detector,
            directory,
            outbox,
        }
    }

    /// Refresh every selected follow once.
    ///
    /// Upstream failures and unsupported follows are counted in
    /// [`BulkRefreshSummary::failed`]. Any [`RefreshError::Store`] aborts
    /// the pass; a constraint violation there is a bug, not a skip.
    pub async fn refresh_all(
        &self,
        limits: RefreshLimits,
        force_fetch: bool,
    ) -> Result<BulkRefreshSummary, RefreshError> {
        let follows = self.directory.list_for_refresh(limits).await?;
        let outbox_before = self.outbox.count_all().await?;

        let mut summary = BulkRefreshSummary {
            processed_follows: follows.len(),
            ..BulkRefreshSummary::default()
        };

        for row in follows {
            let follow_id = row.id;
            let result = match row.into_tracked() {
                Ok(follow) => self.detector.refresh(&follow, force_fetch).await,
                Err(e) => Err(RefreshError::Unsupported(e)),
            };
            match result {
                Ok(events) => summary.events_emitted += events.len(),
                Err(e @ (RefreshError::UpstreamFetch { .. } | RefreshError::Unsupported(_))) => {
                    summary.failed += 1;
                    tracing::warn!(follow_id, error = %e, "Follow refresh failed");
                }
                Err(e) => {
                    tracing::error!(follow_id, error = %e, "Bulk refresh aborted");
                    return Err(e);
                }
            }
        }

        let outbox_after = self.outbox.count_all().await?;
        summary.outbox_enqueued = (outbox_after - outbox_before).max(0);

        tracing::info!(
            processed_follows = summary.processed_follows,
            events_emitted = summary.events_emitted,
            outbox_enqueued = summary.outbox_enqueued,
            failed = summary.failed,
            "Bulk refresh complete",
        );
        Ok(summary)
    }

    /// Refresh all follows of one user, propagating the first error.
    pub async fn refresh_user(
        &self,
        user_id: DbId,
        force_fetch: bool,
    ) -> Result<Vec<EventType>, RefreshError> {
        let follows = self
            .directory
            .list_for_user(user_id)
            .await?
            .into_iter()
            .map(FollowWithPrefs::into_tracked)
            .collect::<Result<Vec<TrackedFollow>, _>>()?;
        self.detector.refresh_user(&follows, force_fetch).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
