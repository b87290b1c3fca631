//! Tracking cache, change detection and bulk refresh.
//!
//! - [`cache::TrackingCache`]: adaptive-TTL snapshot cache over a
//!   [`store::CacheStore`] (Postgres or in-memory).
//! - [`detector::ChangeDetector`]: fetch, diff, and record change events
//!   with their outbox rows in one commit.
//! - [`bulk::BulkRefreshCoordinator`]: sequential refresh over many follows.

pub mod bulk;
pub mod cache;
pub mod detector;
pub mod error;
pub mod locks;
pub mod source;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use bulk::{
    BulkRefreshCoordinator, BulkRefreshSummary, FollowDirectory, PgFollowDirectory,
    RefreshLimits, StaticFollowDirectory,
};
pub use cache::TrackingCache;
pub use detector::ChangeDetector;
pub use error::{RefreshError, SourceError};
pub use locks::KeyedLocks;
pub use source::SourceProvider;
pub use store::memory::MemoryCacheStore;
pub use store::postgres::PgCacheStore;
pub use store::{CacheEntry, CacheStore, CacheWrite, RefreshCommit};
