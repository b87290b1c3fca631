//! Scheduled bulk refresh loop.

use std::sync::Arc;
use std::time::Duration;

use dropbinge_tracking::{BulkRefreshCoordinator, RefreshLimits};
use tokio_util::sync::CancellationToken;

/// Run a bulk refresh every `every` until `cancel` fires.
///
/// Passes do not force a fetch, so fresh cache entries are skipped.
pub async fn run(
    coordinator: Arc<BulkRefreshCoordinator>,
    every: Duration,
    limits: RefreshLimits,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = every.as_secs(),
        limit_users = limits.limit_users,
        limit_follows = limits.limit_follows,
        "Scheduled refresh started",
    );

    let mut interval = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Scheduled refresh stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = coordinator.refresh_all(limits, false).await {
                    tracing::error!(error = %e, "Scheduled refresh failed");
                }
            }
        }
    }
}
