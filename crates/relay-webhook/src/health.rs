//! Webhook health monitoring
//!
//! Once a webhook's health window has elapsed its failure rate is compared
//! against the configured threshold. Unhealthy webhooks are either reported
//! or deactivated in the store, and the window starts over.

use crate::registry::RegistryEntry;
use chrono::{DateTime, Duration, Utc};
use relay_core::{WebhookId, WebhookRepository, WebhooksConfig, MAX_HEALTH_WINDOW_MINUTES};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Health check configuration
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Minimum time between evaluations of one webhook
    pub window: Duration,
    /// Failure rate (percent) that must be exceeded to act
    pub failure_threshold_percent: f64,
    /// Deactivate unhealthy webhooks instead of only warning
    pub auto_disable: bool,
}

impl HealthConfig {
    pub fn new(window: Duration, failure_threshold_percent: f64) -> Self {
        Self {
            window,
            failure_threshold_percent,
            auto_disable: false,
        }
    }

    pub fn with_auto_disable(mut self, enabled: bool) -> Self {
        self.auto_disable = enabled;
        self
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self::new(Duration::minutes(1), 100.0)
    }
}

impl From<&WebhooksConfig> for HealthConfig {
    fn from(config: &WebhooksConfig) -> Self {
        Self::new(
            Duration::minutes(config.health_window_minutes.min(MAX_HEALTH_WINDOW_MINUTES) as i64),
            config.failure_threshold_percent,
        )
        .with_auto_disable(config.auto_disable)
    }
}

/// What the monitor did with an evaluated webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthAction {
    Healthy,
    /// Above threshold, auto-disable off
    Warned,
    Disabled,
    /// Above threshold but the store had no active row to disable
    AlreadyInactive,
    /// Above threshold and the store rejected the update
    DisableFailed,
}

/// Result of evaluating one webhook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthVerdict {
    pub webhook_id: WebhookId,
    pub failure_rate: f64,
    pub action: HealthAction,
}

/// Evaluates failure rates and disables unhealthy webhooks
pub struct HealthMonitor {
    repository: Arc<dyn WebhookRepository>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(repository: Arc<dyn WebhookRepository>, config: HealthConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub async fn check_health(&self, entries: &[RegistryEntry]) -> Vec<HealthVerdict> {
        self.check_health_at(entries, Utc::now()).await
    }

    /// Evaluate every entry whose window has elapsed at `now`.
    ///
    /// Evaluated entries have their statistics reset, whatever the outcome.
    pub async fn check_health_at(
        &self,
        entries: &[RegistryEntry],
        now: DateTime<Utc>,
    ) -> Vec<HealthVerdict> {
        let mut verdicts = Vec::new();

        for entry in entries {
            if now - entry.stats.window_start() < self.config.window {
                continue;
            }

            let webhook_id = entry.id();
            let failure_rate = entry.stats.failure_rate();
            let action = if failure_rate > self.config.failure_threshold_percent {
                self.handle_unhealthy(entry, failure_rate).await
            } else {
                debug!(webhook_id = %webhook_id, failure_rate = failure_rate, "Webhook healthy");
                HealthAction::Healthy
            };

            entry.stats.reset_at(now);
            verdicts.push(HealthVerdict {
                webhook_id,
                failure_rate,
                action,
            });
        }

        verdicts
    }

    async fn handle_unhealthy(&self, entry: &RegistryEntry, failure_rate: f64) -> HealthAction {
        let webhook_id = entry.id();
        let url = &entry.subscription.url;

        if !self.config.auto_disable {
            warn!(
                webhook_id = %webhook_id,
                url = %url,
                failure_rate = failure_rate,
                threshold = self.config.failure_threshold_percent,
                "Webhook failure rate above threshold"
            );
            return HealthAction::Warned;
        }

        match self.repository.deactivate(&webhook_id).await {
            Ok(true) => {
                info!(
                    webhook_id = %webhook_id,
                    url = %url,
                    failure_rate = failure_rate,
                    "Webhook disabled due to failure rate"
                );
                HealthAction::Disabled
            }
            Ok(false) => {
                info!(webhook_id = %webhook_id, url = %url, "Webhook already inactive");
                HealthAction::AlreadyInactive
            }
            Err(e) => {
                error!(
                    webhook_id = %webhook_id,
                    url = %url,
                    error = %e,
                    "Failed to disable webhook"
                );
                HealthAction::DisableFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeliveryStats;
    use async_trait::async_trait;
    use mockall::mock;
    use relay_core::{InMemoryWebhookRepository, RelayError, WebhookSubscription};

    mock! {
        pub Repository {}

        #[async_trait]
        impl WebhookRepository for Repository {
            async fn find_active(&self) -> relay_core::Result<Vec<WebhookSubscription>>;
            async fn find_by_id(&self, id: &WebhookId) -> relay_core::Result<Option<WebhookSubscription>>;
            async fn save(&self, subscription: &WebhookSubscription) -> relay_core::Result<()>;
            async fn deactivate(&self, id: &WebhookId) -> relay_core::Result<bool>;
        }
    }

    fn entry(success: u64, failure: u64, window_start: DateTime<Utc>) -> RegistryEntry {
        let stats = DeliveryStats::starting_at(window_start);
        for _ in 0..success {
            stats.record_success();
        }
        for _ in 0..failure {
            stats.record_failure();
        }
        RegistryEntry::new(WebhookSubscription::new("http://localhost:4815")).with_stats(stats)
    }

    fn monitor(
        repository: Arc<dyn WebhookRepository>,
        threshold: f64,
        auto_disable: bool,
    ) -> HealthMonitor {
        HealthMonitor::new(
            repository,
            HealthConfig::new(Duration::minutes(1), threshold).with_auto_disable(auto_disable),
        )
    }

    #[tokio::test]
    async fn test_window_not_elapsed_is_skipped() {
        let now = Utc::now();
        let monitor = monitor(Arc::new(InMemoryWebhookRepository::new()), 50.0, true);
        let entry = entry(0, 10, now - Duration::seconds(59));

        let verdicts = monitor.check_health_at(&[entry.clone()], now).await;

        assert!(verdicts.is_empty());
        assert_eq!(entry.stats.failure_count(), 10);
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let now = Utc::now();
        let monitor = monitor(Arc::new(InMemoryWebhookRepository::new()), 50.0, false);
        let at_threshold = entry(5, 5, now - Duration::minutes(1));
        let above = entry(4, 6, now - Duration::minutes(1));

        let verdicts = monitor.check_health_at(&[at_threshold, above], now).await;

        assert_eq!(verdicts[0].action, HealthAction::Healthy);
        assert_eq!(verdicts[0].failure_rate, 50.0);
        assert_eq!(verdicts[1].action, HealthAction::Warned);
        assert_eq!(verdicts[1].failure_rate, 60.0);
    }

    #[tokio::test]
    async fn test_default_threshold_never_fires() {
        let now = Utc::now();
        let monitor = HealthMonitor::new(
            Arc::new(InMemoryWebhookRepository::new()),
            HealthConfig::default().with_auto_disable(true),
        );
        let entry = entry(0, 100, now - Duration::minutes(2));

        let verdicts = monitor.check_health_at(&[entry], now).await;

        assert_eq!(verdicts[0].failure_rate, 100.0);
        assert_eq!(verdicts[0].action, HealthAction::Healthy);
    }

    #[tokio::test]
    async fn test_evaluation_resets_stats() {
        let now = Utc::now();
        let monitor = monitor(Arc::new(InMemoryWebhookRepository::new()), 50.0, false);
        let entry = entry(3, 7, now - Duration::minutes(3));

        monitor.check_health_at(&[entry.clone()], now).await;

        assert_eq!(entry.stats.success_count(), 0);
        assert_eq!(entry.stats.failure_count(), 0);
        assert_eq!(entry.stats.window_start(), now);
    }

    #[tokio::test]
    async fn test_auto_disable_deactivates_in_store() {
        let now = Utc::now();
        let entry = entry(0, 4, now - Duration::minutes(1));
        let repository = Arc::new(InMemoryWebhookRepository::with_subscriptions([
            (*entry.subscription).clone(),
        ]));
        let monitor = monitor(repository.clone(), 50.0, true);

        let verdicts = monitor.check_health_at(&[entry.clone()], now).await;

        assert_eq!(verdicts[0].action, HealthAction::Disabled);
        let stored = repository.find_by_id(&entry.id()).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_one_point_above_threshold_disables() {
        let now = Utc::now();
        let at_threshold = entry(50, 50, now - Duration::minutes(1));
        let above = entry(49, 51, now - Duration::minutes(1));
        let repository = Arc::new(InMemoryWebhookRepository::with_subscriptions([
            (*at_threshold.subscription).clone(),
            (*above.subscription).clone(),
        ]));
        let monitor = monitor(repository.clone(), 50.0, true);

        let verdicts = monitor.check_health_at(&[at_threshold.clone(), above.clone()], now).await;

        assert_eq!(verdicts[0].action, HealthAction::Healthy);
        assert_eq!(verdicts[1].action, HealthAction::Disabled);
        assert_eq!(repository.find_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_already_inactive() {
        let now = Utc::now();
        let entry = entry(0, 4, now - Duration::minutes(1));
        let monitor = monitor(Arc::new(InMemoryWebhookRepository::new()), 50.0, true);

        let verdicts = monitor.check_health_at(&[entry], now).await;

        assert_eq!(verdicts[0].action, HealthAction::AlreadyInactive);
    }

    #[tokio::test]
    async fn test_disable_failure_is_reported() {
        let now = Utc::now();
        let entry = entry(0, 4, now - Duration::minutes(1));

        let mut repository = MockRepository::new();
        repository
            .expect_deactivate()
            .times(1)
            .returning(|_| Err(RelayError::Storage("connection reset".to_string())));
        let monitor = monitor(Arc::new(repository), 50.0, true);

        let verdicts = monitor.check_health_at(&[entry.clone()], now).await;

        assert_eq!(verdicts[0].action, HealthAction::DisableFailed);
        assert!(entry.subscription.is_active);
        assert_eq!(entry.stats.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_warn_only_never_touches_store() {
        let now = Utc::now();
        let entry = entry(0, 4, now - Duration::minutes(1));

        let mut repository = MockRepository::new();
        repository.expect_deactivate().never();
        let monitor = monitor(Arc::new(repository), 50.0, false);

        let verdicts = monitor.check_health_at(&[entry], now).await;

        assert_eq!(verdicts[0].action, HealthAction::Warned);
    }

    #[test]
    fn test_config_from_webhooks_config() {
        let config: HealthConfig = (&WebhooksConfig::default()
            .with_health_window_minutes(5)
            .with_failure_threshold_percent(80.0)
            .with_auto_disable(true))
            .into();

        assert_eq!(config.window, Duration::minutes(5));
        assert_eq!(config.failure_threshold_percent, 80.0);
        assert!(config.auto_disable);
    }

    #[test]
    fn test_config_window_is_bounded() {
        let config: HealthConfig =
            (&WebhooksConfig::default().with_health_window_minutes(u64::MAX)).into();

        assert_eq!(config.window, Duration::minutes(MAX_HEALTH_WINDOW_MINUTES as i64));
    }
}
