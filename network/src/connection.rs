//! One server connection: request correlation and the reconnect loop.

use lao_messages::{Answer, AnswerResult, Call, Frame, Query};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tokio::sync::mpsc;

use crate::manager::Hub;
use crate::{ConnectionEvent, NetworkError, Transport};

/// Bounded exponential backoff between connection attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub initial: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Whether attempt number `attempt` is past the budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt > max)
    }
}

/// One server session: JSON-RPC requests matched to answers by id,
/// reconnected with backoff when it drops.
pub struct Connection {
    peer: String,
    transport: Arc<dyn Transport>,
    outbound: RwLock<Option<mpsc::UnboundedSender<String>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Answer>>>,
    ids: Arc<AtomicU64>,
    request_timeout: Duration,
}

impl Connection {
    /// A disconnected connection. `ids` is shared by every connection of a
    /// manager so request ids never collide.
    pub fn new(
        peer: impl Into<String>,
        transport: Arc<dyn Transport>,
        ids: Arc<AtomicU64>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            peer: peer.into(),
            transport,
            outbound: RwLock::new(None),
            pending: Mutex::new(HashMap::new()),
            ids,
            request_timeout,
        }
    }

    /// The server address.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn is_connected(&self) -> bool {
        self.outbound.read().await.is_some()
    }

    /// Send one query and wait for its answer.
    pub async fn request(&self, call: Call) -> Result<AnswerResult, NetworkError> {
        let method = call.method();
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let text = Frame::Query(Query::new(id, call)).to_text()?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let sent = match self.outbound.read().await.as_ref() {
            Some(out) => out.send(text).is_ok(),
            None => false,
        };
        if !sent {
            self.pending.lock().await.remove(&id);
            return Err(NetworkError::NotConnected(self.peer.clone()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(answer)) => answer.outcome.map_err(|e| NetworkError::Rejected {
                peer: self.peer.clone(),
                method,
                code: e.code,
                description: e.description,
            }),
            Ok(Err(_)) => Err(NetworkError::Disconnected(self.peer.clone())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(NetworkError::Timeout {
                    peer: self.peer.clone(),
                    method,
                })
            }
        }
    }

    /// Request that must be acknowledged with `0`.
    pub async fn request_ack(&self, call: Call) -> Result<(), NetworkError> {
        let method = call.method();
        match self.request(call).await? {
            AnswerResult::Ack => Ok(()),
            AnswerResult::Messages(_) => Err(NetworkError::UnexpectedAnswer {
                peer: self.peer.clone(),
                method,
            }),
        }
    }

    /// Connect, serve, and reconnect until shutdown or until attempts run
    /// out.
    pub(crate) async fn run(
        self: Arc<Self>,
        hub: Arc<Hub>,
        policy: ReconnectPolicy,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut attempt = 0u32;
        let mut connected_before = false;
        loop {
            let link = tokio::select! {
                link = self.transport.connect(&self.peer) => link,
                _ = shutdown.changed() => return,
            };
            match link {
                Ok(link) => {
                    attempt = 0;
                    *self.outbound.write().await = Some(link.outbound);
                    let event = if connected_before {
                        ConnectionEvent::Reconnected { peer: self.peer.clone() }
                    } else {
                        ConnectionEvent::Connected { peer: self.peer.clone() }
                    };
                    connected_before = true;
                    tracing::info!(peer = %self.peer, "connected");
                    hub.emit(event);

                    let restore = tokio::spawn(Arc::clone(&self).restore(Arc::clone(&hub)));
                    let reason = self.serve(link.inbound, &hub, &mut shutdown).await;
                    restore.abort();

                    *self.outbound.write().await = None;
                    // Dropping the senders fails every waiting request.
                    self.pending.lock().await.clear();
                    tracing::warn!(peer = %self.peer, reason = %reason, "disconnected");
                    hub.emit(ConnectionEvent::Disconnected {
                        peer: self.peer.clone(),
                        reason,
                    });
                    if *shutdown.borrow() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, attempt, "connection attempt failed");
                }
            }

            attempt += 1;
            if policy.exhausted(attempt) {
                tracing::error!(peer = %self.peer, "giving up on server");
                hub.emit(ConnectionEvent::GaveUp { peer: self.peer.clone() });
                return;
            }
            let delay = policy.delay(attempt);
            tracing::debug!(peer = %self.peer, ?delay, "reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn serve(
        &self,
        mut inbound: mpsc::UnboundedReceiver<String>,
        hub: &Hub,
        shutdown: &mut watch::Receiver<bool>,
    ) -> String {
        loop {
            let text = tokio::select! {
                text = inbound.recv() => text,
                _ = shutdown.changed() => return "shutdown".into(),
            };
            let Some(text) = text else {
                return "closed by peer".into();
            };
            match Frame::parse(&text) {
                Ok(Frame::Answer(answer)) => self.resolve(answer).await,
                Ok(Frame::Query(Query {
                    call: Call::Broadcast { channel, message },
                    ..
                })) => {
                    hub.deliver(&self.peer, channel, message).await;
                }
                Ok(Frame::Query(query)) => {
                    tracing::debug!(peer = %self.peer, method = query.call.method(), "ignoring server query");
                }
                Err(e) => {
                    tracing::warn!(peer = %self.peer, error = %e, "malformed frame");
                }
            }
        }
    }

    async fn resolve(&self, answer: Answer) {
        let Some(id) = answer.id else {
            if let Err(e) = &answer.outcome {
                tracing::warn!(peer = %self.peer, code = e.code, description = %e.description, "server error");
            }
            return;
        };
        match self.pending.lock().await.remove(&id) {
            Some(waiter) => {
                let _ = waiter.send(answer);
            }
            None => tracing::debug!(peer = %self.peer, id, "answer to unknown request"),
        }
    }

    /// Subscribe again to every persisted channel, then catch up on each.
    async fn restore(self: Arc<Self>, hub: Arc<Hub>) {
        let channels = match hub.subscriptions().load() {
            Ok(channels) => channels,
            Err(e) => {
                tracing::error!(peer = %self.peer, error = %e, "cannot load subscriptions");
                return;
            }
        };
        for channel in channels {
            if let Err(e) = self.request_ack(Call::Subscribe { channel: channel.clone() }).await {
                tracing::warn!(peer = %self.peer, channel = %channel, error = %e, "resubscribe failed");
                continue;
            }
            match self.request(Call::Catchup { channel: channel.clone() }).await {
                Ok(AnswerResult::Messages(messages)) => {
                    let count = messages.len();
                    for message in messages {
                        hub.deliver(&self.peer, channel.clone(), message).await;
                    }
                    tracing::debug!(peer = %self.peer, channel = %channel, count, "caught up");
                }
                Ok(AnswerResult::Ack) => {}
                Err(e) => {
                    tracing::warn!(peer = %self.peer, channel = %channel, error = %e, "catch-up failed");
                }
            }
        }
    }
}
