//! Application state and initialization

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use relay_core::{AppConfig, EventStream, MessageHandler, WebhookRepository};
use relay_infra::{create_pool, run_migrations, PgWebhookRepository, QueueConsumer};
use relay_webhook::{
    EventProcessor, HealthConfig, HealthMonitor, RefreshScheduler, WebhookDispatcher,
    WebhookRegistry,
};

use crate::cli::Args;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<WebhookRegistry>,
    /// Decodes queue messages, publishes them in-process and dispatches them
    pub processor: Arc<EventProcessor>,
}

impl AppState {
    /// Connect to storage and wire the delivery pipeline
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("Initializing application components");

        let pool = create_pool(&config.database)
            .await
            .context("Failed to connect to database")?;
        if config.database.run_migrations {
            run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
        }
        let repository: Arc<dyn WebhookRepository> = Arc::new(PgWebhookRepository::new(pool));

        Self::with_repository(config, repository)
    }

    /// Wire the pipeline on top of an existing repository
    pub fn with_repository(
        config: AppConfig,
        repository: Arc<dyn WebhookRepository>,
    ) -> Result<Self> {
        let health = HealthMonitor::new(repository.clone(), HealthConfig::from(&config.webhooks));
        let registry = Arc::new(WebhookRegistry::new(repository, health));

        let dispatcher = WebhookDispatcher::new(registry.clone(), &config.http)
            .context("Failed to create HTTP client")?;

        let events = EventStream::new(config.events.stream_capacity);
        let processor = Arc::new(EventProcessor::new(Arc::new(dispatcher), events));

        Ok(Self {
            config,
            registry,
            processor,
        })
    }
}

/// Main application
pub struct App {
    state: AppState,
}

impl App {
    /// Build the application with all dependencies
    pub async fn build(args: Args) -> Result<Self> {
        args.validate().context("Invalid command line arguments")?;

        let config = load_config(&args)?;
        let state = AppState::new(config).await?;

        Ok(Self { state })
    }

    /// Run until a shutdown signal arrives or the consumer stops
    pub async fn run(self) -> Result<()> {
        let AppState {
            config,
            registry,
            processor,
        } = self.state;

        let report = registry
            .try_refresh()
            .await
            .context("Failed to load webhooks")?;
        info!(webhooks = report.loaded, "Loaded active webhooks");

        let cancel = CancellationToken::new();
        let scheduler = RefreshScheduler::new(registry, config.webhooks.refresh_interval())
            .spawn(cancel.clone());

        let consumer = QueueConsumer::connect(&config.amqp)
            .await
            .context("Failed to connect to message broker")?;
        let handler: Arc<dyn MessageHandler> = processor;
        let mut consumer_task = tokio::spawn(consumer.run(handler, cancel.clone()));

        let consumer_result = tokio::select! {
            _ = shutdown_signal() => {
                info!("Shutdown signal received");
                cancel.cancel();
                (&mut consumer_task).await
            }
            result = &mut consumer_task => {
                cancel.cancel();
                result
            }
        };

        scheduler.await.context("Refresh scheduler task failed")?;
        consumer_result
            .context("Queue consumer task failed")?
            .context("Queue consumer stopped with an error")?;

        Ok(())
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let config = match &args.config {
        Some(path) => AppConfig::load_from_file(&path.to_string_lossy()),
        None => AppConfig::load(),
    };
    config.context("Failed to load configuration")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use relay_core::{InMemoryWebhookRepository, WebhookSubscription};

    #[tokio::test]
    async fn test_app_state_with_repository() {
        let config = AppConfig::load_from_env("RELAY_APP_TEST").unwrap();
        let repository = Arc::new(InMemoryWebhookRepository::with_subscriptions([
            WebhookSubscription::new("http://localhost:4815"),
        ]));

        let state = AppState::with_repository(config, repository).unwrap();
        state.registry.try_refresh().await.unwrap();

        assert_eq!(state.registry.len(), 1);
        assert_eq!(state.processor.stream().subscriber_count(), 0);
    }

    #[test]
    fn test_load_config_without_file() {
        let args = Args::parse_from(["relay-server"]);
        let config = load_config(&args).unwrap();

        assert_eq!(config.amqp.prefetch, 10);
    }
}
