use async_trait::async_trait;
use tracing::info;

use ledger_types::{DomainEvent, EventPublisher, PublishError};

/// Writes every event as one structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event)?;
        info!(
            target: "ledger::events",
            event = event.name(),
            account_id = %event.account_id(),
            occurred_on = %event.occurred_on(),
            payload = %payload,
            "Domain event published"
        );
        Ok(())
    }
}
