//! Core types for the indexer events relay.
//!
//! Holds the inbound event model, webhook subscriptions, the storage
//! contract and configuration shared by the other crates.

pub mod config;
pub mod error;
pub mod events;
pub mod repository;
pub mod stream;
pub mod subscription;
pub mod traits;

pub use crate::config::*;
pub use crate::error::*;
pub use events::{CategoryGroup, EventCategory, EventError, TxServiceEvent, UnknownName};
pub use repository::{InMemoryWebhookRepository, WebhookRepository};
pub use stream::{EventStream, EventSubscription};
pub use subscription::{
    is_ethereum_address, ValidationError, WebhookId, WebhookRequest, WebhookSubscription,
    MAX_ADDRESSES, MAX_FIELD_LENGTH,
};
pub use traits::MessageHandler;
