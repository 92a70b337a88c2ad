//! Webhook delivery for the indexer events relay
//!
//! This crate turns accepted events into HTTP calls:
//! - Registry of active webhooks with per-webhook delivery statistics
//! - Relevance matching by chain and event group
//! - Concurrent fan-out delivery without retries
//! - Failure-rate health checks with optional auto-disable
//! - Periodic registry refresh
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_core::{EventStream, HttpConfig, InMemoryWebhookRepository, WebhooksConfig};
//! use relay_webhook::{EventProcessor, HealthMonitor, WebhookDispatcher, WebhookRegistry};
//! use std::sync::Arc;
//!
//! let repository = Arc::new(InMemoryWebhookRepository::new());
//! let health = HealthMonitor::new(repository.clone(), (&WebhooksConfig::default()).into());
//! let registry = Arc::new(WebhookRegistry::new(repository, health));
//! registry.refresh().await;
//!
//! let dispatcher = Arc::new(WebhookDispatcher::new(registry, &HttpConfig::default())?);
//! let processor = EventProcessor::new(dispatcher, EventStream::default());
//! processor.process(br#"{"chainId":"1","type":"SAFE_CREATED","address":"0xabc"}"#).await;
//! ```

pub mod dispatcher;
pub mod health;
pub mod matcher;
pub mod processor;
pub mod registry;
pub mod scheduler;

pub use dispatcher::*;
pub use health::*;
pub use matcher::is_relevant;
pub use processor::*;
pub use registry::*;
pub use scheduler::*;

use relay_core::RelayError;
use thiserror::Error;

/// Webhook errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RelayError),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
