use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use ledger_types::{DomainEvent, EventPublisher, PublishError};

/// Fans events out to in-process subscribers.
///
/// Slow subscribers lag and lose the oldest events; publishing never waits.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        if self.sender.send(event.clone()).is_err() {
            debug!(event = event.name(), "No subscribers, event dropped");
        }
        Ok(())
    }
}
