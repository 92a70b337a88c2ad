//! Indexer event model
//!
//! Defines the inbound event shape, the closed set of event categories and
//! the category groups subscribers toggle on their webhooks.

use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Event categories emitted by the transaction indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    NewConfirmation,
    ConfirmationRequest,
    PendingMultisigTransaction,
    ExecutedMultisigTransaction,
    DeletedMultisigTransaction,
    IncomingEther,
    OutgoingEther,
    IncomingToken,
    OutgoingToken,
    ModuleTransaction,
    SafeCreated,
    MessageCreated,
    MessageConfirmation,
    ReorgDetected,
    NewDelegate,
    UpdatedDelegate,
    DeletedDelegate,
}

impl EventCategory {
    pub const ALL: [EventCategory; 17] = [
        Self::NewConfirmation,
        Self::ConfirmationRequest,
        Self::PendingMultisigTransaction,
        Self::ExecutedMultisigTransaction,
        Self::DeletedMultisigTransaction,
        Self::IncomingEther,
        Self::OutgoingEther,
        Self::IncomingToken,
        Self::OutgoingToken,
        Self::ModuleTransaction,
        Self::SafeCreated,
        Self::MessageCreated,
        Self::MessageConfirmation,
        Self::ReorgDetected,
        Self::NewDelegate,
        Self::UpdatedDelegate,
        Self::DeletedDelegate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewConfirmation => "NEW_CONFIRMATION",
            Self::ConfirmationRequest => "CONFIRMATION_REQUEST",
            Self::PendingMultisigTransaction => "PENDING_MULTISIG_TRANSACTION",
            Self::ExecutedMultisigTransaction => "EXECUTED_MULTISIG_TRANSACTION",
            Self::DeletedMultisigTransaction => "DELETED_MULTISIG_TRANSACTION",
            Self::IncomingEther => "INCOMING_ETHER",
            Self::OutgoingEther => "OUTGOING_ETHER",
            Self::IncomingToken => "INCOMING_TOKEN",
            Self::OutgoingToken => "OUTGOING_TOKEN",
            Self::ModuleTransaction => "MODULE_TRANSACTION",
            Self::SafeCreated => "SAFE_CREATED",
            Self::MessageCreated => "MESSAGE_CREATED",
            Self::MessageConfirmation => "MESSAGE_CONFIRMATION",
            Self::ReorgDetected => "REORG_DETECTED",
            Self::NewDelegate => "NEW_DELEGATE",
            Self::UpdatedDelegate => "UPDATED_DELEGATE",
            Self::DeletedDelegate => "DELETED_DELEGATE",
        }
    }

    /// Get the subscriber flag group this category belongs to
    pub fn group(&self) -> CategoryGroup {
        match self {
            Self::NewConfirmation | Self::ConfirmationRequest => CategoryGroup::Confirmations,
            Self::PendingMultisigTransaction
            | Self::ExecutedMultisigTransaction
            | Self::DeletedMultisigTransaction => CategoryGroup::MultisigTxs,
            Self::IncomingEther | Self::OutgoingEther => CategoryGroup::EtherTransfers,
            Self::IncomingToken | Self::OutgoingToken => CategoryGroup::TokenTransfers,
            Self::ModuleTransaction => CategoryGroup::ModuleTransactions,
            Self::SafeCreated => CategoryGroup::SafeCreations,
            Self::MessageCreated | Self::MessageConfirmation => CategoryGroup::Messages,
            Self::ReorgDetected => CategoryGroup::Reorgs,
            Self::NewDelegate | Self::UpdatedDelegate | Self::DeletedDelegate => {
                CategoryGroup::Delegates
            }
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// Subscriber-configurable groups of event categories.
///
/// Each webhook carries one boolean per group; a group covers one to three
/// [`EventCategory`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CategoryGroup {
    #[serde(rename = "SEND_CONFIRMATIONS")]
    Confirmations,
    #[serde(rename = "SEND_MULTISIG_TXS")]
    MultisigTxs,
    #[serde(rename = "SEND_ETHER_TRANSFERS")]
    EtherTransfers,
    #[serde(rename = "SEND_TOKEN_TRANSFERS")]
    TokenTransfers,
    #[serde(rename = "SEND_MODULE_TXS")]
    ModuleTransactions,
    #[serde(rename = "SEND_SAFE_CREATIONS")]
    SafeCreations,
    #[serde(rename = "SEND_MESSAGES")]
    Messages,
    #[serde(rename = "SEND_REORGS")]
    Reorgs,
    #[serde(rename = "SEND_DELEGATES")]
    Delegates,
}

impl CategoryGroup {
    pub const ALL: [CategoryGroup; 9] = [
        Self::Confirmations,
        Self::MultisigTxs,
        Self::EtherTransfers,
        Self::TokenTransfers,
        Self::ModuleTransactions,
        Self::SafeCreations,
        Self::Messages,
        Self::Reorgs,
        Self::Delegates,
    ];

    /// Name used by the registration API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmations => "SEND_CONFIRMATIONS",
            Self::MultisigTxs => "SEND_MULTISIG_TXS",
            Self::EtherTransfers => "SEND_ETHER_TRANSFERS",
            Self::TokenTransfers => "SEND_TOKEN_TRANSFERS",
            Self::ModuleTransactions => "SEND_MODULE_TXS",
            Self::SafeCreations => "SEND_SAFE_CREATIONS",
            Self::Messages => "SEND_MESSAGES",
            Self::Reorgs => "SEND_REORGS",
            Self::Delegates => "SEND_DELEGATES",
        }
    }

    pub fn categories(&self) -> &'static [EventCategory] {
        use EventCategory::*;
        match self {
            Self::Confirmations => &[NewConfirmation, ConfirmationRequest],
            Self::MultisigTxs => &[
                PendingMultisigTransaction,
                ExecutedMultisigTransaction,
                DeletedMultisigTransaction,
            ],
            Self::EtherTransfers => &[IncomingEther, OutgoingEther],
            Self::TokenTransfers => &[IncomingToken, OutgoingToken],
            Self::ModuleTransactions => &[ModuleTransaction],
            Self::SafeCreations => &[SafeCreated],
            Self::Messages => &[MessageCreated, MessageConfirmation],
            Self::Reorgs => &[ReorgDetected],
            Self::Delegates => &[NewDelegate, UpdatedDelegate, DeletedDelegate],
        }
    }
}

impl fmt::Display for CategoryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryGroup {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|group| group.as_str() == s)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// A category or group name that is not part of the closed set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown name: {0}")]
pub struct UnknownName(pub String);

/// Reasons an inbound message is rejected before dispatch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Message is not valid UTF-8")]
    InvalidUtf8,

    #[error("Message is not a JSON object: {0}")]
    InvalidJson(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Event published by the transaction indexer.
///
/// Only `chainId`, `address` and `type` are interpreted; every other field is
/// kept in `extra`. Events decoded from the queue also keep the exact text
/// they arrived as, which is what webhooks receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxServiceEvent {
    /// Chain the event happened on
    #[serde(rename = "chainId", default, deserialize_with = "chain_id_from_json")]
    pub chain_id: String,
    /// Safe address the event refers to, empty when the event has none
    #[serde(default, deserialize_with = "string_or_null")]
    pub address: String,
    /// Category tag
    #[serde(rename = "type", default, deserialize_with = "string_or_null")]
    pub event_type: String,
    /// Remaining fields, forwarded untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    #[serde(skip)]
    raw: Option<Arc<str>>,
}

impl TxServiceEvent {
    /// Create an event without a raw body; [`Self::body`] serializes it
    pub fn new(
        chain_id: impl Into<String>,
        event_type: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            address: address.into(),
            event_type: event_type.into(),
            extra: serde_json::Map::new(),
            raw: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Decode and validate a queue message body
    pub fn from_slice(payload: &[u8]) -> Result<Self, EventError> {
        let text = std::str::from_utf8(payload).map_err(|_| EventError::InvalidUtf8)?;
        Self::from_json(text)
    }

    /// Decode and validate a JSON text, keeping the text as the event body
    pub fn from_json(text: &str) -> Result<Self, EventError> {
        let mut event: TxServiceEvent =
            serde_json::from_str(text).map_err(|e| EventError::InvalidJson(e.to_string()))?;
        event.validate()?;
        event.raw = Some(Arc::from(text));
        Ok(event)
    }

    /// Check the fields every dispatchable event must carry
    pub fn validate(&self) -> Result<(), EventError> {
        if self.chain_id.is_empty() {
            return Err(EventError::MissingField("chainId"));
        }
        if self.event_type.is_empty() {
            return Err(EventError::MissingField("type"));
        }
        Ok(())
    }

    /// Parsed category, `None` for tags outside the known set
    pub fn category(&self) -> Option<EventCategory> {
        self.event_type.parse().ok()
    }

    /// JSON body sent to webhooks
    pub fn body(&self) -> Cow<'_, str> {
        match &self.raw {
            Some(raw) => Cow::Borrowed(raw),
            None => Cow::Owned(serde_json::to_string(self).unwrap_or_default()),
        }
    }
}

fn chain_id_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!("invalid chainId: {other}"))),
    }
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
