//! Event publisher port.

use crate::domain::DomainEvent;

/// Error returned by a publisher that could not deliver an event.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Outbound channel for domain events.
///
/// Events are published only after the state change they describe has been
/// committed. Callers log failures; they never undo the commit.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync + 'static {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError>;
}

#[async_trait::async_trait]
impl<P: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<P> {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        (**self).publish(event).await
    }
}
