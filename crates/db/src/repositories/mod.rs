//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Methods suffixed `_in_tx` take
//! an open transaction so a caller can group writes atomically.

pub mod change_event_repo;
pub mod follow_repo;
pub mod outbox_repo;
pub mod tracking_cache_repo;
pub mod user_repo;

pub use change_event_repo::ChangeEventRepo;
pub use follow_repo::FollowRepo;
pub use outbox_repo::OutboxRepo;
pub use tracking_cache_repo::TrackingCacheRepo;
pub use user_repo::UserRepo;
