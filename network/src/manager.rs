//! Fan-out over every configured server.

use futures_util::future::join_all;
use lao_messages::{AnswerResult, Call, MessageGeneral};
use lao_store::SubscriptionStore;
use lao_types::Channel;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::{
    join_tasks, Connection, ConnectionEvent, InboundMessage, MessageDedup, NetworkError, ReconnectPolicy,
    Transport, DEFAULT_DEDUP_CAPACITY,
};

const EVENT_CAPACITY: usize = 64;

/// Servers to talk to and how to talk to them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Server addresses, one connection each.
    pub servers: Vec<String>,
    /// How long to wait for any single answer.
    pub request_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// Message ids remembered for cross-server dedup.
    pub dedup_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            request_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

/// State shared by all connections of a manager.
pub(crate) struct Hub {
    subscriptions: Arc<dyn SubscriptionStore>,
    dedup: Mutex<MessageDedup>,
    observer: Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl Hub {
    pub(crate) fn subscriptions(&self) -> &dyn SubscriptionStore {
        self.subscriptions.as_ref()
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Deliver a message unless it was already seen. Returns whether it was
    /// new.
    pub(crate) async fn deliver(&self, peer: &str, channel: Channel, message: MessageGeneral) -> bool {
        if self.dedup.lock().await.is_duplicate(&message.message_id) {
            return false;
        }
        let observer = self.observer.lock().await;
        match observer.as_ref() {
            Some(tx) => {
                let inbound = InboundMessage {
                    peer: peer.to_string(),
                    channel,
                    message,
                };
                if tx.send(inbound).is_err() {
                    tracing::debug!(peer, "message observer is gone");
                }
            }
            None => tracing::debug!(peer, message_id = %message.message_id, "no message observer"),
        }
        true
    }
}

/// Every server connection, fanned out to as one.
pub struct ConnectionManager {
    connections: Vec<Arc<Connection>>,
    hub: Arc<Hub>,
    reconnect: ReconnectPolicy,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Build the connections. Nothing connects until [`ConnectionManager::start`].
    pub fn new(
        config: &NetworkConfig,
        transport: Arc<dyn Transport>,
        subscriptions: Arc<dyn SubscriptionStore>,
    ) -> Self {
        let ids = Arc::new(AtomicU64::new(1));
        let connections = config
            .servers
            .iter()
            .map(|peer| {
                Arc::new(Connection::new(
                    peer.clone(),
                    Arc::clone(&transport),
                    Arc::clone(&ids),
                    config.request_timeout,
                ))
            })
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        Self {
            connections,
            hub: Arc::new(Hub {
                subscriptions,
                dedup: Mutex::new(MessageDedup::new(config.dedup_capacity)),
                observer: Mutex::new(None),
                events,
            }),
            reconnect: config.reconnect.clone(),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one supervisor task per server.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }
        for connection in &self.connections {
            tasks.push(tokio::spawn(Arc::clone(connection).run(
                Arc::clone(&self.hub),
                self.reconnect.clone(),
                self.shutdown.subscribe(),
            )));
        }
        tracing::info!(servers = self.connections.len(), "connection manager started");
    }

    /// Stop every connection and wait for their tasks.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        join_tasks(tasks, "connection").await;
    }

    /// Publish on every server. Succeeds once all of them acknowledged.
    pub async fn publish(&self, channel: &Channel, message: &MessageGeneral) -> Result<(), NetworkError> {
        self.ack_all(Call::Publish {
            channel: channel.clone(),
            message: message.clone(),
        })
        .await
    }

    /// Subscribe on every server, then persist the subscription.
    pub async fn subscribe(&self, channel: &Channel) -> Result<(), NetworkError> {
        self.ack_all(Call::Subscribe {
            channel: channel.clone(),
        })
        .await?;
        self.hub.subscriptions.add(channel)?;
        Ok(())
    }

    /// Forget the channel and unsubscribe on every server.
    pub async fn unsubscribe(&self, channel: &Channel) -> Result<(), NetworkError> {
        self.hub.subscriptions.remove(channel)?;
        self.ack_all(Call::Unsubscribe {
            channel: channel.clone(),
        })
        .await
    }

    /// Fetch the history of `channel` from every server. New messages go to
    /// the message stream like broadcasts; returns how many were new.
    pub async fn catchup(&self, channel: &Channel) -> Result<usize, NetworkError> {
        let answers = self
            .fan_out(Call::Catchup {
                channel: channel.clone(),
            })
            .await?;
        let mut delivered = 0;
        for (connection, answer) in self.connections.iter().zip(answers) {
            let AnswerResult::Messages(messages) = answer else {
                continue;
            };
            for message in messages {
                if self.hub.deliver(connection.peer(), channel.clone(), message).await {
                    delivered += 1;
                }
            }
        }
        Ok(delivered)
    }

    /// A fresh stream of inbound messages. Calling this again ends the
    /// previous stream.
    pub async fn observe_messages(&self) -> mpsc::UnboundedReceiver<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.hub.observer.lock().await = Some(tx);
        rx
    }

    pub fn observe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.hub.events.subscribe()
    }

    /// Configured server addresses.
    pub fn peers(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.peer()).collect()
    }

    /// How many servers have a live session.
    pub async fn connected_peers(&self) -> usize {
        let mut count = 0;
        for connection in &self.connections {
            if connection.is_connected().await {
                count += 1;
            }
        }
        count
    }

    pub fn subscriptions(&self) -> &dyn SubscriptionStore {
        self.hub.subscriptions()
    }

    async fn ack_all(&self, call: Call) -> Result<(), NetworkError> {
        let method = call.method();
        let answers = self.fan_out(call).await?;
        for (connection, answer) in self.connections.iter().zip(answers) {
            if answer != AnswerResult::Ack {
                return Err(NetworkError::UnexpectedAnswer {
                    peer: connection.peer().to_string(),
                    method,
                });
            }
        }
        Ok(())
    }

    /// Send to every server; fail with the first error once all answered.
    async fn fan_out(&self, call: Call) -> Result<Vec<AnswerResult>, NetworkError> {
        if self.connections.is_empty() {
            return Err(NetworkError::NoPeers);
        }
        let results = join_all(self.connections.iter().map(|c| c.request(call.clone()))).await;
        results.into_iter().collect()
    }
}
