use async_trait::async_trait;
use tracing::{error, warn};

use ledger_types::{DomainEvent, EventPublisher, PublishError};

use crate::retry::RetryPolicy;

/// Retries a publisher with backoff, then logs and swallows the failure.
#[derive(Debug, Clone)]
pub struct RetryingPublisher<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: EventPublisher> RetryingPublisher<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: EventPublisher> EventPublisher for RetryingPublisher<P> {
    async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
        let mut retry = 0;
        loop {
            match self.inner.publish(event).await {
                Ok(()) => return Ok(()),
                // Encoding is deterministic, another try cannot help.
                Err(err @ PublishError::Encode(_)) => {
                    error!(event = event.name(), error = %err, "Event cannot be encoded");
                    return Ok(());
                }
                Err(err) if retry < self.policy.max_retries() => {
                    let delay = self.policy.delay_for(retry);
                    warn!(
                        event = event.name(),
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Event delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(err) => {
                    error!(event = event.name(), error = %err, "Giving up on event delivery");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::AccountId;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EventPublisher for Flaky {
        async fn publish(&self, _event: &DomainEvent) -> Result<(), PublishError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(PublishError::Delivery("broker unavailable".into()))
            } else {
                Ok(())
            }
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new().with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let publisher = RetryingPublisher::new(
            Flaky {
                failures: 2,
                calls: AtomicU32::new(0),
            },
            policy(),
        );

        let event = DomainEvent::account_blocked(AccountId::new());
        assert!(publisher.publish(&event).await.is_ok());
        assert_eq!(publisher.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_final_failure_is_swallowed() {
        let publisher = RetryingPublisher::new(
            Flaky {
                failures: u32::MAX,
                calls: AtomicU32::new(0),
            },
            policy(),
        );

        let event = DomainEvent::account_blocked(AccountId::new());
        assert!(publisher.publish(&event).await.is_ok());
        assert_eq!(publisher.inner().calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_policy_bounds_the_wait() {
        let publisher = RetryingPublisher::new(
            Flaky {
                failures: u32::MAX,
                calls: AtomicU32::new(0),
            },
            RetryPolicy::delivery(),
        );

        let started = tokio::time::Instant::now();
        let event = DomainEvent::account_blocked(AccountId::new());
        assert!(publisher.publish(&event).await.is_ok());

        assert_eq!(publisher.inner().calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
