//! Periodic registry refresh

use crate::registry::WebhookRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shortest period the scheduler runs with
pub const MIN_REFRESH_PERIOD: Duration = Duration::from_secs(1);

/// Refreshes a [`WebhookRegistry`] on a fixed period until cancelled.
///
/// The first tick fires one period after start; the initial load is the
/// caller's job so that no event is dispatched against an empty registry.
pub struct RefreshScheduler {
    registry: Arc<WebhookRegistry>,
    period: Duration,
}

impl RefreshScheduler {
    /// Periods below [`MIN_REFRESH_PERIOD`] are raised to it
    pub fn new(registry: Arc<WebhookRegistry>, period: Duration) -> Self {
        if period < MIN_REFRESH_PERIOD {
            warn!(
                requested_ms = period.as_millis() as u64,
                period_ms = MIN_REFRESH_PERIOD.as_millis() as u64,
                "Refresh period too short, using minimum"
            );
        }
        Self {
            registry,
            period: period.max(MIN_REFRESH_PERIOD),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Run until `cancel` fires. Refresh failures are logged by the registry.
    pub async fn run(self, cancel: CancellationToken) {
        info!(period_secs = self.period.as_secs(), "Starting webhook refresh scheduler");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Webhook refresh scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.registry.refresh().await;
                }
            }
        }

        info!("Webhook refresh scheduler stopped");
    }
}
