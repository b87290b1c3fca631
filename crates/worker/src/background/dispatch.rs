//! Outbox dispatch loop.
//!
//! Every tick runs one dispatch pass per channel. Channels without a
//! configured provider are skipped unless the pass is a dry run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dropbinge_core::channels::Channel;
use dropbinge_events::{ChannelProvider, DispatchOptions, DispatchSummary, OutboxDispatcher};
use tokio_util::sync::CancellationToken;

pub struct DispatchLoop {
    dispatcher: OutboxDispatcher,
    providers: HashMap<Channel, Arc<dyn ChannelProvider>>,
    options: DispatchOptions,
    interval: Duration,
}

impl DispatchLoop {
    pub fn new(dispatcher: OutboxDispatcher, options: DispatchOptions, interval: Duration) -> Self {
        Self {
            dispatcher,
            providers: HashMap::new(),
            options,
            interval,
        }
    }

    /// Register the provider for its channel, replacing any previous one.
    pub fn with_provider(mut self, provider: Arc<dyn ChannelProvider>) -> Self {
        self.providers.insert(provider.channel(), provider);
        self
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let channels: Vec<&str> = self.providers.keys().map(|c| c.as_str()).collect();
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.options.batch_size,
            dry_run = self.options.dry_run,
            ?channels,
            "Outbox dispatch loop started",
        );

        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Outbox dispatch loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// One pass over every dispatchable channel. Storage errors are logged
    /// and the remaining channels still run.
    pub async fn run_cycle(&self) -> Vec<(Channel, DispatchSummary)> {
        let mut results = Vec::new();
        for channel in Channel::ALL {
            let provider = self.providers.get(&channel).map(|p| p.as_ref());
            if provider.is_none() && !self.options.dry_run {
                tracing::debug!(%channel, "No provider configured, skipping channel");
                continue;
            }

            match self.dispatcher.dispatch_once(channel, provider, &self.options).await {
                Ok(summary) => results.push((channel, summary)),
                Err(e) => {
                    tracing::error!(%channel, error = %e, "Dispatch cycle failed");
                }
            }
        }
        results
    }
}
