use std::sync::Arc;
use std::time::Duration;

use dropbinge_core::clock::{Clock, SystemClock};
use dropbinge_events::{
    EmailConfig, EmailDelivery, GatewayConfig, GatewayDelivery, OutboxDispatcher, OutboxStore,
    PgOutboxStore, TemplateRenderer,
};
use dropbinge_tmdb::{TmdbClient, TmdbConfig};
use dropbinge_tracking::{
    BulkRefreshCoordinator, ChangeDetector, PgCacheStore, PgFollowDirectory, TrackingCache,
};
use dropbinge_worker::background::{dispatch::DispatchLoop, refresh};
use dropbinge_worker::config::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dropbinge_worker=debug,dropbinge_events=info,dropbinge_tracking=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env().expect("Invalid worker configuration");

    // --- Database ---

    let pool = dropbinge_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    dropbinge_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection established");

    dropbinge_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let outbox: Arc<dyn OutboxStore> = Arc::new(PgOutboxStore::new(pool.clone()));

    // --- Outbox dispatch ---

    let renderer = TemplateRenderer::new(config.app_base_url.clone());
    let mut dispatch = DispatchLoop::new(
        OutboxDispatcher::new(Arc::clone(&outbox), renderer),
        config.dispatch,
        config.poll_interval,
    );
    match EmailConfig::from_env().map(EmailDelivery::new) {
        Some(Ok(email)) => dispatch = dispatch.with_provider(Arc::new(email)),
        Some(Err(e)) => {
            tracing::error!(error = %e, "Email provider misconfigured, channel disabled")
        }
        None => tracing::warn!("SMTP_HOST not set, email channel disabled"),
    }
    match GatewayConfig::from_env().map(GatewayDelivery::new) {
        Some(Ok(gateway)) => dispatch = dispatch.with_provider(Arc::new(gateway)),
        Some(Err(e)) => {
            tracing::error!(error = %e, "Messaging gateway misconfigured, channel disabled")
        }
        None => tracing::info!("WHATSAPP_GATEWAY_URL not set, whatsapp channel disabled"),
    }

    let dispatch_cancel = CancellationToken::new();
    let dispatch_handle = {
        let cancel = dispatch_cancel.clone();
        tokio::spawn(async move { dispatch.run(cancel).await })
    };

    // --- Scheduled refresh ---

    let refresh_cancel = CancellationToken::new();
    let refresh_handle = match TmdbConfig::from_env().map(TmdbClient::new) {
        Some(Ok(client)) => {
            let cache = TrackingCache::new(
                Arc::new(PgCacheStore::new(pool.clone())),
                Arc::clone(&clock),
            );
            let detector = Arc::new(ChangeDetector::new(cache, Arc::new(client), clock));
            let coordinator = Arc::new(BulkRefreshCoordinator::new(
                detector,
                Arc::new(PgFollowDirectory::new(pool.clone())),
                outbox,
            ));
            Some(tokio::spawn(refresh::run(
                coordinator,
                config.refresh_interval,
                config.refresh_limits,
                refresh_cancel.clone(),
            )))
        }
        Some(Err(e)) => {
            tracing::error!(
                error = %e,
                "Content API client failed to build, scheduled refresh disabled",
            );
            None
        }
        None => {
            tracing::warn!("TMDB_BEARER_TOKEN/TMDB_API_KEY not set, scheduled refresh disabled");
            None
        }
    };

    tracing::info!("Worker running");
    shutdown_signal().await;

    // --- Shutdown ---

    dispatch_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), dispatch_handle).await;
    tracing::info!("Dispatch loop stopped");

    refresh_cancel.cancel();
    if let Some(handle) = refresh_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Scheduled refresh stopped");
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
