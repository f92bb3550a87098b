//! Nullable transport: in-memory servers that answer like a real one.
//!
//! Each peer name maps to a [`NullServer`]. A server acknowledges
//! `publish`, `subscribe` and `unsubscribe`, answers `catchup` with what was
//! published or seeded on the channel, and echoes publications as broadcasts
//! on subscribed channels. Tests can take it offline, cut the session,
//! reject methods or push broadcasts.

use async_trait::async_trait;
use lao_messages::{Answer, Call, Frame, MessageGeneral, Query};
use lao_network::{Link, NetworkError, Transport};
use lao_types::Channel;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Default)]
struct ServerState {
    online: bool,
    silent: bool,
    /// Generation and sender of the live session.
    session: Option<(usize, mpsc::UnboundedSender<String>)>,
    connects: usize,
    received: Vec<Query>,
    history: HashMap<Channel, Vec<MessageGeneral>>,
    subscribed: BTreeSet<Channel>,
    rejected: HashSet<&'static str>,
}

pub struct NullServer {
    peer: String,
    state: Mutex<ServerState>,
}

impl NullServer {
    fn new(peer: &str) -> Self {
        Self {
            peer: peer.to_string(),
            state: Mutex::new(ServerState {
                online: true,
                ..ServerState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Refuse new connections while offline.
    pub fn set_online(&self, online: bool) {
        self.state().online = online;
    }

    /// Stop answering queries.
    pub fn set_silent(&self, silent: bool) {
        self.state().silent = silent;
    }

    /// Answer `method` with an error from now on.
    pub fn reject(&self, method: &'static str) {
        self.state().rejected.insert(method);
    }

    /// Cut the current session, as if the socket closed.
    pub fn drop_session(&self) {
        self.state().session = None;
    }

    pub fn is_connected(&self) -> bool {
        self.state().session.is_some()
    }

    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    /// Make `message` part of the channel history.
    pub fn seed(&self, channel: &Channel, message: MessageGeneral) {
        self.state()
            .history
            .entry(channel.clone())
            .or_default()
            .push(message);
    }

    /// Push a broadcast to the connected client.
    pub fn push_broadcast(&self, channel: &Channel, message: MessageGeneral) -> bool {
        let Ok(text) = Frame::Query(Query::broadcast(channel.clone(), message)).to_text() else {
            return false;
        };
        match &self.state().session {
            Some((_, session)) => session.send(text).is_ok(),
            None => false,
        }
    }

    /// Every query received so far.
    pub fn received(&self) -> Vec<Query> {
        self.state().received.clone()
    }

    pub fn received_methods(&self) -> Vec<&'static str> {
        self.state().received.iter().map(|q| q.call.method()).collect()
    }

    /// Messages published on `channel`.
    pub fn published(&self, channel: &Channel) -> Vec<MessageGeneral> {
        self.state()
            .received
            .iter()
            .filter_map(|q| match &q.call {
                Call::Publish { channel: c, message } if c == channel => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn subscribed(&self) -> BTreeSet<Channel> {
        self.state().subscribed.clone()
    }

    fn accept(self: &Arc<Self>) -> Result<Link, NetworkError> {
        let (client_tx, mut server_rx) = mpsc::unbounded_channel::<String>();
        let (server_tx, client_rx) = mpsc::unbounded_channel::<String>();
        let generation = {
            let mut state = self.state();
            if !state.online {
                return Err(NetworkError::ConnectionFailed {
                    peer: self.peer.clone(),
                    reason: "server offline".into(),
                });
            }
            state.connects += 1;
            state.subscribed.clear();
            state.session = Some((state.connects, server_tx));
            state.connects
        };

        let server = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(text) = server_rx.recv().await {
                if !server.handle(&text, generation) {
                    return;
                }
            }
            // Client hung up.
            let mut state = server.state();
            if state.session.as_ref().is_some_and(|(g, _)| *g == generation) {
                state.session = None;
            }
        });

        Ok(Link {
            outbound: client_tx,
            inbound: client_rx,
        })
    }

    /// Serve one frame. Returns `false` once the session is gone.
    fn handle(&self, text: &str, generation: usize) -> bool {
        let mut state = self.state();
        let session = match &state.session {
            Some((g, session)) if *g == generation => session.clone(),
            _ => return false,
        };
        let Ok(Frame::Query(query)) = Frame::parse(text) else {
            tracing::debug!(peer = %self.peer, "null server ignoring frame");
            return true;
        };
        state.received.push(query.clone());
        let Some(id) = query.id else {
            return true;
        };
        if state.silent {
            return true;
        }
        let method = query.call.method();
        let answer = if state.rejected.contains(method) {
            Answer::error(Some(id), -4, format!("{method} rejected"))
        } else {
            match query.call {
                Call::Publish { channel, message } => {
                    state.history.entry(channel.clone()).or_default().push(message.clone());
                    if state.subscribed.contains(&channel) {
                        if let Ok(text) = Frame::Query(Query::broadcast(channel, message)).to_text() {
                            let _ = session.send(text);
                        }
                    }
                    Answer::ack(id)
                }
                Call::Subscribe { channel } => {
                    state.subscribed.insert(channel);
                    Answer::ack(id)
                }
                Call::Unsubscribe { channel } => {
                    state.subscribed.remove(&channel);
                    Answer::ack(id)
                }
                Call::Catchup { channel } => {
                    Answer::messages(id, state.history.get(&channel).cloned().unwrap_or_default())
                }
                Call::Broadcast { .. } => return true,
            }
        };
        match Frame::Answer(answer).to_text() {
            Ok(text) => session.send(text).is_ok(),
            Err(_) => true,
        }
    }
}

/// A transport whose servers live in memory.
#[derive(Default)]
pub struct NullTransport {
    servers: Mutex<HashMap<String, Arc<NullServer>>>,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The server behind `peer`, created on first use.
    pub fn server(&self, peer: &str) -> Arc<NullServer> {
        let mut servers = self.servers.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            servers
                .entry(peer.to_string())
                .or_insert_with(|| Arc::new(NullServer::new(peer))),
        )
    }
}

#[async_trait]
impl Transport for NullTransport {
    async fn connect(&self, peer: &str) -> Result<Link, NetworkError> {
        self.server(peer).accept()
    }
}
