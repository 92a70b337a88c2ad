//! Infrastructure for the events relay: Postgres-backed webhook storage and
//! the AMQP queue consumer.

pub mod database;
pub mod messaging;

pub use database::{create_pool, run_migrations, PgWebhookRepository};
pub use messaging::amqp::QueueConsumer;

use relay_core::RelayError;

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] lapin::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<InfraError> for RelayError {
    fn from(error: InfraError) -> Self {
        RelayError::Storage(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InfraError>;
