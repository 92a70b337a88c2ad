//! Webhook subscriptions
//!
//! A subscription is the durable record of a delivery target and its
//! filters. It is owned by the registration store; the relay only reads it
//! and may flip `is_active` off.

use crate::events::CategoryGroup;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of the description and url columns
pub const MAX_FIELD_LENGTH: usize = 300;

/// Maximum number of addresses a webhook may list
pub const MAX_ADDRESSES: usize = 100;

/// Public identifier of a webhook, stable across updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookId(pub Uuid);

impl WebhookId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WebhookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for WebhookId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Webhook subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: WebhookId,
    /// Target URL
    pub url: String,
    pub description: String,
    /// Whether the webhook receives events
    pub is_active: bool,
    /// Raw `Authorization` header value, empty for none
    pub authorization: String,
    /// Chain ids to deliver, empty for every chain
    pub chains: Vec<String>,
    /// Addresses registered with the webhook. Stored for the registration
    /// API; delivery does not filter on them.
    pub addresses: Vec<String>,
    pub send_confirmations: bool,
    pub send_multisig_txs: bool,
    pub send_ether_transfers: bool,
    pub send_token_transfers: bool,
    pub send_module_transactions: bool,
    pub send_safe_creations: bool,
    pub send_messages: bool,
    pub send_reorgs: bool,
    pub send_delegates: bool,
}

impl WebhookSubscription {
    /// Create an active subscription for every chain and every group
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: WebhookId::new(),
            url: url.into(),
            description: String::new(),
            is_active: true,
            authorization: String::new(),
            chains: Vec::new(),
            addresses: Vec::new(),
            send_confirmations: true,
            send_multisig_txs: true,
            send_ether_transfers: true,
            send_token_transfers: true,
            send_module_transactions: true,
            send_safe_creations: true,
            send_messages: true,
            send_reorgs: true,
            send_delegates: true,
        }
    }

    pub fn with_id(mut self, id: WebhookId) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = authorization.into();
        self
    }

    pub fn with_chains<I, S>(mut self, chains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chains = chains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    /// Enable only the given groups
    pub fn with_groups(mut self, groups: &[CategoryGroup]) -> Self {
        for group in CategoryGroup::ALL {
            self.set_sends(group, groups.contains(&group));
        }
        self
    }

    pub fn with_group(mut self, group: CategoryGroup, enabled: bool) -> Self {
        self.set_sends(group, enabled);
        self
    }

    /// Whether events of the group are delivered to this webhook
    pub fn sends(&self, group: CategoryGroup) -> bool {
        match group {
            CategoryGroup::Confirmations => self.send_confirmations,
            CategoryGroup::MultisigTxs => self.send_multisig_txs,
            CategoryGroup::EtherTransfers => self.send_ether_transfers,
            CategoryGroup::TokenTransfers => self.send_token_transfers,
            CategoryGroup::ModuleTransactions => self.send_module_transactions,
            CategoryGroup::SafeCreations => self.send_safe_creations,
            CategoryGroup::Messages => self.send_messages,
            CategoryGroup::Reorgs => self.send_reorgs,
            CategoryGroup::Delegates => self.send_delegates,
        }
    }

    pub fn set_sends(&mut self, group: CategoryGroup, enabled: bool) {
        let flag = match group {
            CategoryGroup::Confirmations => &mut self.send_confirmations,
            CategoryGroup::MultisigTxs => &mut self.send_multisig_txs,
            CategoryGroup::EtherTransfers => &mut self.send_ether_transfers,
            CategoryGroup::TokenTransfers => &mut self.send_token_transfers,
            CategoryGroup::ModuleTransactions => &mut self.send_module_transactions,
            CategoryGroup::SafeCreations => &mut self.send_safe_creations,
            CategoryGroup::Messages => &mut self.send_messages,
            CategoryGroup::Reorgs => &mut self.send_reorgs,
            CategoryGroup::Delegates => &mut self.send_delegates,
        };
        *flag = enabled;
    }

    pub fn enabled_groups(&self) -> Vec<CategoryGroup> {
        CategoryGroup::ALL
            .into_iter()
            .filter(|group| self.sends(*group))
            .collect()
    }
}

/// Registration request validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Description must not be empty")]
    EmptyDescription,

    #[error("Description must not exceed 300 characters")]
    DescriptionTooLong,

    #[error("Url must not exceed 300 characters")]
    UrlTooLong,

    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("A maximum of 100 addresses is allowed")]
    TooManyAddresses,

    #[error("Invalid Ethereum address: {0}")]
    InvalidAddress(String),

    #[error("At least one event group is required")]
    NoEvents,

    #[error("Unknown event group: {0}")]
    UnknownEvent(String),
}

/// Payload accepted by the registration API when creating or updating a
/// webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub description: String,
    pub url: String,
    pub is_active: bool,
    pub authorization: String,
    pub chains: Vec<u64>,
    /// Ethereum addresses, `0x` followed by 40 hex digits
    pub addresses: Vec<String>,
    /// Group names, e.g. `SEND_SAFE_CREATIONS`
    pub events: Vec<String>,
}

impl WebhookRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.description.is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        if self.description.chars().count() > MAX_FIELD_LENGTH {
            return Err(ValidationError::DescriptionTooLong);
        }
        if self.url.chars().count() > MAX_FIELD_LENGTH {
            return Err(ValidationError::UrlTooLong);
        }
        let scheme_ok = self.url.starts_with("http://") || self.url.starts_with("https://");
        if !scheme_ok || !validator::validate_url(self.url.as_str()) {
            return Err(ValidationError::InvalidUrl(self.url.clone()));
        }
        if self.addresses.len() > MAX_ADDRESSES {
            return Err(ValidationError::TooManyAddresses);
        }
        if let Some(invalid) = self.addresses.iter().find(|a| !is_ethereum_address(a)) {
            return Err(ValidationError::InvalidAddress(invalid.clone()));
        }
        if self.events.is_empty() {
            return Err(ValidationError::NoEvents);
        }
        self.groups().map(|_| ())
    }

    /// Requested groups, rejecting unknown names
    pub fn groups(&self) -> Result<Vec<CategoryGroup>, ValidationError> {
        self.events
            .iter()
            .map(|name| {
                name.parse::<CategoryGroup>()
                    .map_err(|_| ValidationError::UnknownEvent(name.clone()))
            })
            .collect()
    }

    /// Validate and build a new subscription
    pub fn into_subscription(self, id: WebhookId) -> Result<WebhookSubscription, ValidationError> {
        let mut subscription = WebhookSubscription::new(self.url.clone()).with_id(id);
        self.apply_to(&mut subscription)?;
        Ok(subscription)
    }

    /// Validate and overwrite the mutable fields of an existing subscription
    pub fn apply_to(&self, subscription: &mut WebhookSubscription) -> Result<(), ValidationError> {
        self.validate()?;
        let groups = self.groups()?;

        subscription.url = self.url.clone();
        subscription.description = self.description.clone();
        subscription.is_active = self.is_active;
        subscription.authorization = self.authorization.clone();
        subscription.chains = self.chains.iter().map(u64::to_string).collect();
        subscription.addresses = self.addresses.clone();
        for group in CategoryGroup::ALL {
            subscription.set_sends(group, groups.contains(&group));
        }
        Ok(())
    }
}

/// `0x` followed by 40 hex digits
pub fn is_ethereum_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}
