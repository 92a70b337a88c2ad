//! In-process event stream.
//!
//! Every accepted event is published here before it is dispatched, so local
//! consumers (such as a per-Safe live feed) can follow the relay without a
//! second queue binding.

use crate::events::TxServiceEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// Broadcast hub for accepted events
#[derive(Debug, Clone)]
pub struct EventStream {
    sender: broadcast::Sender<Arc<TxServiceEvent>>,
}

impl EventStream {
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every current subscriber; having none is not an error
    pub fn publish(&self, event: Arc<TxServiceEvent>) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            address: None,
        }
    }

    /// Subscribe to events of a single Safe
    pub fn subscribe_for_safe(&self, address: impl Into<String>) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            address: Some(address.into()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Receiving side of an [`EventStream`]
#[derive(Debug)]
pub struct EventSubscription {
    receiver: broadcast::Receiver<Arc<TxServiceEvent>>,
    address: Option<String>,
}

impl EventSubscription {
    /// Next matching event, or `None` once the stream is closed
    pub async fn recv(&mut self) -> Option<Arc<TxServiceEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Event stream subscriber lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn accepts(&self, event: &TxServiceEvent) -> bool {
        match &self.address {
            Some(address) => event.address == *address,
            None => true,
        }
    }
}
