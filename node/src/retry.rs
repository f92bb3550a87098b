//! Publication retries.
//!
//! Handlers never wait for a server acknowledgment. Each outbound message is
//! handed to the [`RetryScheduler`], which publishes it on a background task
//! and retries with bounded exponential backoff until every server
//! acknowledged, the attempts run out, or the owning LAO is torn down.

use async_trait::async_trait;
use lao_messages::MessageGeneral;
use lao_network::{ConnectionManager, NetworkError};
use lao_types::Channel;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::events::{EventBus, NodeEvent};
use crate::metrics::DispatchMetrics;
use crate::scope::ScopeToken;

/// Bounded exponential backoff for publications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Attempts in total; `None` retries until cancelled.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            max_attempts: Some(8),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Whether `attempts` attempts used up the budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Where publications go. The connection manager in production, a fake in
/// tests.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, channel: &Channel, message: &MessageGeneral) -> Result<(), NetworkError>;
}

#[async_trait]
impl Publisher for ConnectionManager {
    async fn publish(&self, channel: &Channel, message: &MessageGeneral) -> Result<(), NetworkError> {
        ConnectionManager::publish(self, channel, message).await
    }
}

/// Publishes in the background, retrying failures until acknowledged,
/// exhausted or cancelled by the publication's scope.
pub struct RetryScheduler {
    publisher: Arc<dyn Publisher>,
    policy: RetryPolicy,
    events: Arc<EventBus>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl RetryScheduler {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        policy: RetryPolicy,
        events: Arc<EventBus>,
        metrics: Option<Arc<DispatchMetrics>>,
    ) -> Self {
        Self {
            publisher,
            policy,
            events,
            metrics,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Publish in the background. The task resolves to whether the message
    /// was acknowledged.
    pub fn schedule(&self, channel: Channel, message: MessageGeneral, token: ScopeToken) -> JoinHandle<bool> {
        let publisher = Arc::clone(&self.publisher);
        let policy = self.policy.clone();
        let events = Arc::clone(&self.events);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            publish_with_retry(publisher, policy, events, metrics, channel, message, token).await
        })
    }
}

async fn publish_with_retry(
    publisher: Arc<dyn Publisher>,
    policy: RetryPolicy,
    events: Arc<EventBus>,
    metrics: Option<Arc<DispatchMetrics>>,
    channel: Channel,
    message: MessageGeneral,
    mut token: ScopeToken,
) -> bool {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if attempt > 1 {
            if let Some(m) = &metrics {
                m.publication_retries.inc();
            }
        }
        let result = tokio::select! {
            result = publisher.publish(&channel, &message) => result,
            _ = token.cancelled() => {
                tracing::debug!(channel = %channel, message_id = %message.message_id, "publication cancelled");
                return false;
            }
        };
        let error = match result {
            Ok(()) => {
                tracing::debug!(channel = %channel, message_id = %message.message_id, attempt, "published");
                return true;
            }
            Err(e) => e,
        };
        if policy.exhausted(attempt) {
            tracing::warn!(
                channel = %channel,
                message_id = %message.message_id,
                attempts = attempt,
                error = %error,
                "publication abandoned"
            );
            if let Some(m) = &metrics {
                m.publications_failed.inc();
            }
            events.emit(NodeEvent::PublicationFailed {
                channel,
                message_id: message.message_id,
                reason: error.to_string(),
            });
            return false;
        }
        let delay = policy.delay(attempt);
        tracing::debug!(
            channel = %channel,
            message_id = %message.message_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "publication failed, retrying"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.cancelled() => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::LaoScopes;
    use lao_crypto::generate_keypair;
    use lao_messages::data::AddChirp;
    use lao_messages::Data;
    use lao_types::{Hash, Timestamp};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls.
    struct FlakyPublisher {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Publisher for FlakyPublisher {
        async fn publish(&self, _: &Channel, _: &MessageGeneral) -> Result<(), NetworkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(NetworkError::NotConnected("s".into()))
            } else {
                Ok(())
            }
        }
    }

    fn fast(max_attempts: Option<u32>) -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(5),
            max_attempts,
        }
    }

    fn message() -> MessageGeneral {
        let data = Data::AddChirp(AddChirp {
            text: "hi".into(),
            parent_id: None,
            timestamp: Timestamp::new(1),
        });
        MessageGeneral::new(&generate_keypair(), &data).unwrap()
    }

    fn scheduler(failures: u32, policy: RetryPolicy) -> (RetryScheduler, Arc<FlakyPublisher>, Arc<DispatchMetrics>, Arc<EventBus>) {
        let publisher = Arc::new(FlakyPublisher {
            failures,
            calls: AtomicU32::new(0),
        });
        let metrics = Arc::new(DispatchMetrics::new().unwrap());
        let events = Arc::new(EventBus::new());
        let scheduler = RetryScheduler::new(
            publisher.clone(),
            policy,
            Arc::clone(&events),
            Some(Arc::clone(&metrics)),
        );
        (scheduler, publisher, metrics, events)
    }

    #[test]
    fn delay_doubles_up_to_max() {
        let policy = RetryPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(350),
            max_attempts: Some(3),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(350));
        assert_eq!(policy.delay(40), Duration::from_millis(350));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(!fast(None).exhausted(u32::MAX));
    }

    #[tokio::test]
    async fn retries_until_acknowledged() {
        let (scheduler, publisher, metrics, _) = scheduler(2, fast(Some(5)));
        let ok = scheduler
            .schedule(Channel::root(), message(), ScopeToken::detached())
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.publication_retries.get(), 2);
        assert_eq!(metrics.publications_failed.get(), 0);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (scheduler, publisher, metrics, events) = scheduler(u32::MAX, fast(Some(3)));
        let mut stream = events.stream();
        let msg = message();
        let ok = scheduler
            .schedule(Channel::root(), msg.clone(), ScopeToken::detached())
            .await
            .unwrap();
        assert!(!ok);
        assert_eq!(publisher.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.publications_failed.get(), 1);
        match stream.recv().await.unwrap() {
            NodeEvent::PublicationFailed { message_id, .. } => assert_eq!(message_id, msg.message_id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn teardown_cancels_pending_retries() {
        let (scheduler, _, _, _) = scheduler(u32::MAX, RetryPolicy {
            initial: Duration::from_secs(60),
            max: Duration::from_secs(60),
            max_attempts: None,
        });
        let scopes = LaoScopes::new();
        let lao = Hash::from_bytes([1u8; 32]);
        let task = scheduler.schedule(Channel::lao(&lao), message(), scopes.token(&lao));
        tokio::time::sleep(Duration::from_millis(10)).await;
        scopes.teardown(&lao);
        let ok = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(!ok);
    }
}
