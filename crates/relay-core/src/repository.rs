//! Storage contract for webhook subscriptions
//!
//! The relay never talks to the database directly; everything it needs from
//! the registration store goes through [`WebhookRepository`].

use crate::subscription::{WebhookId, WebhookSubscription};
use crate::{RelayError, Result};
use async_trait::async_trait;
use dashmap::DashMap;

/// Webhook subscription repository
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// All subscriptions with `is_active = true`
    async fn find_active(&self) -> Result<Vec<WebhookSubscription>>;

    async fn find_by_id(&self, id: &WebhookId) -> Result<Option<WebhookSubscription>>;

    /// Insert or update a subscription
    async fn save(&self, subscription: &WebhookSubscription) -> Result<()>;

    /// Mark a subscription inactive.
    ///
    /// Returns `false` when no active subscription with that id exists.
    async fn deactivate(&self, id: &WebhookId) -> Result<bool>;
}

/// In-memory subscription repository
pub struct InMemoryWebhookRepository {
    subscriptions: DashMap<WebhookId, WebhookSubscription>,
}

impl InMemoryWebhookRepository {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
        }
    }

    pub fn with_subscriptions(subscriptions: impl IntoIterator<Item = WebhookSubscription>) -> Self {
        let repository = Self::new();
        for subscription in subscriptions {
            repository.subscriptions.insert(subscription.id, subscription);
        }
        repository
    }

    /// Remove a subscription, as the registration API's delete does
    pub fn remove(&self, id: &WebhookId) -> Result<()> {
        self.subscriptions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RelayError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl Default for InMemoryWebhookRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookRepository for InMemoryWebhookRepository {
    async fn find_active(&self) -> Result<Vec<WebhookSubscription>> {
        Ok(self
            .subscriptions
            .iter()
            .filter(|s| s.is_active)
            .map(|s| s.clone())
            .collect())
    }

    async fn find_by_id(&self, id: &WebhookId) -> Result<Option<WebhookSubscription>> {
        Ok(self.subscriptions.get(id).map(|s| s.clone()))
    }

    async fn save(&self, subscription: &WebhookSubscription) -> Result<()> {
        self.subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn deactivate(&self, id: &WebhookId) -> Result<bool> {
        match self.subscriptions.get_mut(id) {
            Some(mut subscription) if subscription.is_active => {
                subscription.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
