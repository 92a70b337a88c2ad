//! Transport-independent handling of inbound messages

use crate::dispatcher::{DeliveryOutcome, WebhookDispatcher};
use async_trait::async_trait;
use relay_core::{EventError, EventStream, MessageHandler, TxServiceEvent};
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to one inbound message
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Rejected before dispatch
    Dropped(EventError),
    /// Accepted; one outcome per webhook called
    Dispatched(Vec<DeliveryOutcome>),
}

/// Decodes messages, publishes them locally and dispatches them
pub struct EventProcessor {
    dispatcher: Arc<WebhookDispatcher>,
    stream: EventStream,
}

impl EventProcessor {
    pub fn new(dispatcher: Arc<WebhookDispatcher>, stream: EventStream) -> Self {
        Self { dispatcher, stream }
    }

    pub fn stream(&self) -> &EventStream {
        &self.stream
    }

    pub async fn process(&self, payload: &[u8]) -> ProcessOutcome {
        let event = match TxServiceEvent::from_slice(payload) {
            Ok(event) => Arc::new(event),
            Err(e) => {
                warn!(
                    error = %e,
                    message = %String::from_utf8_lossy(payload),
                    "Dropping invalid event"
                );
                return ProcessOutcome::Dropped(e);
            }
        };

        debug!(
            chain_id = %event.chain_id,
            event_type = %event.event_type,
            address = %event.address,
            "Processing event"
        );

        self.stream.publish(event.clone());
        let outcomes = self.dispatcher.post_every_webhook(&event).await;
        ProcessOutcome::Dispatched(outcomes)
    }
}

#[async_trait]
impl MessageHandler for EventProcessor {
    async fn handle(&self, payload: &[u8]) {
        self.process(payload).await;
    }
}
