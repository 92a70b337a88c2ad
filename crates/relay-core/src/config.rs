use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub amqp: AmqpConfig,
    pub http: HttpConfig,
    pub webhooks: WebhooksConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub events: EventStreamConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("RELAY")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?.add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.webhooks.validate()
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("amqp.url", default_amqp_url())?
            .set_default("amqp.exchange", default_exchange())?
            .set_default("amqp.queue", default_queue())?
            .set_default("amqp.prefetch", default_prefetch() as u64)?
            .set_default("http.timeout_ms", default_timeout_ms())?
            .set_default("http.max_redirects", default_max_redirects() as u64)?
            .set_default(
                "webhooks.refresh_interval_seconds",
                default_refresh_interval_seconds(),
            )?
            .set_default(
                "webhooks.health_window_minutes",
                default_health_window_minutes(),
            )?
            .set_default(
                "webhooks.failure_threshold_percent",
                default_failure_threshold_percent(),
            )?
            .set_default("webhooks.auto_disable", false)?
            .set_default("database.url", "postgres://localhost/safe_events")?
            .set_default("database.max_connections", default_max_connections() as u64)?
            .set_default("database.min_connections", default_min_connections() as u64)?
            .set_default("database.run_migrations", true)?
            .set_default("events.stream_capacity", default_stream_capacity() as u64)
    }
}

/// Message queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AmqpConfig {
    pub url: String,
    /// Fanout exchange the indexer publishes to
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// Durable queue bound to the exchange
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Unacknowledged messages the broker may push at once
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,
}

impl AmqpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: default_exchange(),
            queue: default_queue(),
            prefetch: default_prefetch(),
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self::new(default_amqp_url())
    }
}

fn default_amqp_url() -> String {
    "amqp://localhost:5672".to_string()
}

fn default_exchange() -> String {
    "safe-transaction-service-events".to_string()
}

fn default_queue() -> String {
    "safe-events-service".to_string()
}

fn default_prefetch() -> u16 {
    10
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Redirects followed per delivery; `0` disables following
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl HttpConfig {
    pub fn new() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_timeout_ms() -> u64 {
    1_000
}

fn default_max_redirects() -> usize {
    0
}

/// Longest accepted health window, one week
pub const MAX_HEALTH_WINDOW_MINUTES: u64 = 7 * 24 * 60;

/// Registry refresh and health monitoring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default = "default_refresh_interval_seconds")]
    pub refresh_interval_seconds: u64,
    #[serde(default = "default_health_window_minutes")]
    pub health_window_minutes: u64,
    /// Failure rate (percent) a webhook must exceed to be flagged
    #[serde(default = "default_failure_threshold_percent")]
    pub failure_threshold_percent: f64,
    #[serde(default)]
    pub auto_disable: bool,
}

impl WebhooksConfig {
    pub fn new() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval_seconds(),
            health_window_minutes: default_health_window_minutes(),
            failure_threshold_percent: default_failure_threshold_percent(),
            auto_disable: false,
        }
    }

    pub fn with_refresh_interval_seconds(mut self, seconds: u64) -> Self {
        self.refresh_interval_seconds = seconds;
        self
    }

    pub fn with_health_window_minutes(mut self, minutes: u64) -> Self {
        self.health_window_minutes = minutes;
        self
    }

    pub fn with_failure_threshold_percent(mut self, percent: f64) -> Self {
        self.failure_threshold_percent = percent;
        self
    }

    pub fn with_auto_disable(mut self, enabled: bool) -> Self {
        self.auto_disable = enabled;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn health_window(&self) -> Duration {
        Duration::from_secs(self.health_window_minutes.saturating_mul(60))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "webhooks.refresh_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.health_window_minutes > MAX_HEALTH_WINDOW_MINUTES {
            return Err(ConfigError::Message(format!(
                "webhooks.health_window_minutes must not exceed {MAX_HEALTH_WINDOW_MINUTES}"
            )));
        }
        if self.failure_threshold_percent.is_nan() || self.failure_threshold_percent < 0.0 {
            return Err(ConfigError::Message(
                "webhooks.failure_threshold_percent must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_refresh_interval_seconds() -> u64 {
    60
}

fn default_health_window_minutes() -> u64 {
    1
}

fn default_failure_threshold_percent() -> f64 {
    100.0
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            run_migrations: default_run_migrations(),
        }
    }

    pub fn with_pool_size(mut self, min: u32, max: u32) -> Self {
        self.min_connections = min;
        self.max_connections = max;
        self
    }

    pub fn with_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_run_migrations() -> bool {
    true
}

/// In-process event stream configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventStreamConfig {
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            stream_capacity: default_stream_capacity(),
        }
    }
}

fn default_stream_capacity() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amqp_config_creation() {
        let config = AmqpConfig::new("amqp://rabbit:5672")
            .with_exchange("events")
            .with_queue("relay")
            .with_prefetch(50);

        assert_eq!(config.url, "amqp://rabbit:5672");
        assert_eq!(config.exchange, "events");
        assert_eq!(config.queue, "relay");
        assert_eq!(config.prefetch, 50);
    }

    #[test]
    fn test_amqp_config_defaults() {
        let config = AmqpConfig::default();

        assert_eq!(config.exchange, "safe-transaction-service-events");
        assert_eq!(config.queue, "safe-events-service");
        assert_eq!(config.prefetch, 10);
    }

    #[test]
    fn test_http_config() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert_eq!(config.max_redirects, 0);

        let config = config.with_timeout_ms(2_500).with_max_redirects(3);
        assert_eq!(config.timeout(), Duration::from_millis(2_500));
        assert_eq!(config.max_redirects, 3);
    }

    #[test]
    fn test_webhooks_config_defaults() {
        let config = WebhooksConfig::default();

        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.health_window(), Duration::from_secs(60));
        assert_eq!(config.failure_threshold_percent, 100.0);
        assert!(!config.auto_disable);
    }

    #[test]
    fn test_database_config_creation() {
        let config = DatabaseConfig::new("postgres://localhost".to_string())
            .with_pool_size(5, 20)
            .with_migrations(false);

        assert_eq!(config.url, "postgres://localhost");
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.max_connections, 20);
        assert!(!config.run_migrations);
    }

    #[test]
    fn test_load_from_env_uses_defaults() {
        let config = AppConfig::load_from_env("RELAY_TEST_UNSET_PREFIX").unwrap();

        assert_eq!(config.amqp.url, "amqp://localhost:5672");
        assert_eq!(config.http.timeout_ms, 1_000);
        assert_eq!(config.webhooks.health_window_minutes, 1);
        assert_eq!(config.events.stream_capacity, 1024);
    }

    #[test]
    fn test_webhooks_config_validation() {
        assert!(WebhooksConfig::default().validate().is_ok());

        let zero_interval = WebhooksConfig::default().with_refresh_interval_seconds(0);
        assert!(matches!(zero_interval.validate(), Err(ConfigError::Message(_))));

        let huge_window = WebhooksConfig::default().with_health_window_minutes(u64::MAX);
        assert!(matches!(huge_window.validate(), Err(ConfigError::Message(_))));
        assert_eq!(huge_window.health_window(), Duration::from_secs(u64::MAX));

        let at_limit = WebhooksConfig::default().with_health_window_minutes(MAX_HEALTH_WINDOW_MINUTES);
        assert!(at_limit.validate().is_ok());

        let nan_threshold = WebhooksConfig::default().with_failure_threshold_percent(f64::NAN);
        assert!(nan_threshold.validate().is_err());
    }

    #[test]
    fn test_load_rejects_zero_refresh_interval() {
        std::env::set_var("RELAY_ZERO_TEST__WEBHOOKS__REFRESH_INTERVAL_SECONDS", "0");
        let result = AppConfig::load_from_env("RELAY_ZERO_TEST");
        std::env::remove_var("RELAY_ZERO_TEST__WEBHOOKS__REFRESH_INTERVAL_SECONDS");

        assert!(matches!(result, Err(ConfigError::Message(_))));
    }
}
