//! Background re-fetch of keys that have waiting requests.
//!
//! # Responsibilities
//! - Periodically fetch every key some client is long-polling on
//! - Feed results through the orchestrator so waiters get answered
//! - Drop registry entries whose callers gave up
//! - Back off while every source keeps failing

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::SourcesConfig;
use crate::proxy::ProxyServer;
use crate::resilience::backoff::Backoff;

pub struct UpstreamRefresher {
    server: Arc<ProxyServer>,
    interval: Duration,
    max_backoff: Duration,
}

/// Result of one pass over the pending keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRound {
    pub attempted: usize,
    pub fetched: usize,
}

impl RefreshRound {
    fn all_failed(&self) -> bool {
        self.attempted > 0 && self.fetched == 0
    }
}

impl UpstreamRefresher {
    pub fn new(server: Arc<ProxyServer>, config: &SourcesConfig) -> Self {
        Self {
            server,
            interval: Duration::from_millis(config.refresh_interval_ms.max(1)),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Upstream refresher starting");

        let mut backoff = Backoff::new(self.interval, self.max_backoff);
        loop {
            tokio::select! {
                _ = time::sleep(backoff.delay()) => {
                    let round = self.refresh_once().await;
                    if round.all_failed() {
                        backoff.record_failure();
                        tracing::debug!(failed_rounds = backoff.failures(), "Every refresh fetch failed, backing off");
                    } else {
                        backoff.reset();
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Upstream refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Fetch each key that has waiters once. No-op outside Default mode.
    pub async fn refresh_once(&self) -> RefreshRound {
        let delayed = self.server.delayed();
        delayed.prune_closed();

        let mut round = RefreshRound::default();
        if !self.server.mode().get().requires_config_source() {
            return round;
        }

        let keys: BTreeSet<_> = delayed.pending_keys().into_iter().collect();
        for key in keys {
            // Pass the cached generation so the source knows what we hold.
            let generation = self
                .server
                .cache()
                .get(&key)
                .map_or(0, |cached| cached.generation());
            round.attempted += 1;
            if let Ok(config) = self.server.sources().fetch(&key, generation).await {
                round.fetched += 1;
                self.server.update_config(config);
            }
        }
        if round.attempted > 0 {
            tracing::debug!(attempted = round.attempted, fetched = round.fetched, "Refresh round done");
        }
        round
    }
}
