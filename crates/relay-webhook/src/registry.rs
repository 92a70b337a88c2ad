//! In-memory registry of active webhooks
//!
//! The registry keeps a snapshot of every active subscription together with
//! its delivery statistics. A refresh builds a complete new map and swaps it
//! in at once, so readers always see either the old or the new snapshot.

use crate::health::{HealthMonitor, HealthVerdict};
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use relay_core::{WebhookId, WebhookRepository, WebhookSubscription};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Delivery counters for one webhook over the current health window.
///
/// Counters are never persisted. Updates are best effort: an increment racing
/// with a reset may be lost.
#[derive(Debug)]
pub struct DeliveryStats {
    success: AtomicU64,
    failure: AtomicU64,
    window_start: Mutex<DateTime<Utc>>,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Zeroed counters with a window opening at `window_start`
    pub fn starting_at(window_start: DateTime<Utc>) -> Self {
        Self {
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            window_start: Mutex::new(window_start),
        }
    }

    pub fn record_success(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        *self.window_start.lock()
    }

    /// Failed deliveries as a percentage of all deliveries, `0` when none
    pub fn failure_rate(&self) -> f64 {
        let success = self.success_count();
        let failure = self.failure_count();
        let total = success + failure;
        if total == 0 {
            return 0.0;
        }
        failure as f64 / total as f64 * 100.0
    }

    /// Zero both counters and open a new window at `now`
    pub fn reset_at(&self, now: DateTime<Utc>) {
        self.success.store(0, Ordering::Relaxed);
        self.failure.store(0, Ordering::Relaxed);
        *self.window_start.lock() = now;
    }
}

impl Default for DeliveryStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A subscription snapshot and its live statistics
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub subscription: Arc<WebhookSubscription>,
    pub stats: Arc<DeliveryStats>,
}

impl RegistryEntry {
    pub fn new(subscription: WebhookSubscription) -> Self {
        Self {
            subscription: Arc::new(subscription),
            stats: Arc::new(DeliveryStats::new()),
        }
    }

    pub fn with_stats(mut self, stats: DeliveryStats) -> Self {
        self.stats = Arc::new(stats);
        self
    }

    pub fn id(&self) -> WebhookId {
        self.subscription.id
    }
}

/// Summary of one refresh
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Active subscriptions returned by the store
    pub loaded: usize,
    /// Entries that kept their statistics
    pub kept: usize,
    /// Entries seen for the first time
    pub added: usize,
    /// Entries no longer active
    pub dropped: usize,
    /// Health evaluations performed before loading
    pub verdicts: Vec<HealthVerdict>,
}

/// Registry of active webhooks
pub struct WebhookRegistry {
    repository: Arc<dyn WebhookRepository>,
    health: HealthMonitor,
    entries: RwLock<Arc<HashMap<WebhookId, RegistryEntry>>>,
}

impl WebhookRegistry {
    /// Create an empty registry; call [`Self::refresh`] before dispatching
    pub fn new(repository: Arc<dyn WebhookRepository>, health: HealthMonitor) -> Self {
        Self {
            repository,
            health,
            entries: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Copy of the current snapshot
    pub fn get_active(&self) -> Vec<RegistryEntry> {
        self.snapshot().values().cloned().collect()
    }

    pub fn get(&self, id: &WebhookId) -> Option<RegistryEntry> {
        self.snapshot().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Arc<HashMap<WebhookId, RegistryEntry>> {
        self.entries.read().clone()
    }

    /// Run health checks, reload active subscriptions and swap the snapshot.
    ///
    /// Failures are logged and the previous snapshot stays in place.
    pub async fn refresh(&self) -> Option<RefreshReport> {
        match self.try_refresh().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!(error = %e, "Failed to refresh webhooks, keeping previous snapshot");
                None
            }
        }
    }

    /// Like [`Self::refresh`], returning the error instead of logging it
    pub async fn try_refresh(&self) -> Result<RefreshReport> {
        let current = self.snapshot();

        let entries: Vec<RegistryEntry> = current.values().cloned().collect();
        let verdicts = self.health.check_health(&entries).await;

        let subscriptions = self.repository.find_active().await?;
        let now = Utc::now();

        let mut report = RefreshReport {
            loaded: subscriptions.len(),
            verdicts,
            ..RefreshReport::default()
        };

        let mut next = HashMap::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let stats = match current.get(&subscription.id) {
                Some(existing) => {
                    report.kept += 1;
                    existing.stats.clone()
                }
                None => {
                    report.added += 1;
                    Arc::new(DeliveryStats::starting_at(now))
                }
            };
            next.insert(
                subscription.id,
                RegistryEntry {
                    subscription: Arc::new(subscription),
                    stats,
                },
            );
        }
        report.dropped = current.keys().filter(|id| !next.contains_key(*id)).count();

        *self.entries.write() = Arc::new(next);

        if report.added > 0 || report.dropped > 0 {
            info!(
                loaded = report.loaded,
                added = report.added,
                dropped = report.dropped,
                "Webhook registry updated"
            );
        } else {
            debug!(loaded = report.loaded, "Webhook registry refreshed");
        }

        Ok(report)
    }
}
