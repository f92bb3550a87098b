//! The LAO client, wiring the protocol engines to the network.
//!
//! A [`LaoClient`] owns every repository and engine (through
//! [`ClientState`]), the connection manager and the dispatcher. Inbound
//! messages flow from the connection manager into the dispatcher; messages
//! the handlers want published (consensus learns) are signed with the local
//! key and handed to the retry scheduler under the scope of their LAO.
//!
//! Every action method publishes a signed message and waits for every server
//! to acknowledge it. The message is then applied locally through the same
//! pipeline as inbound messages; the server echo is a duplicate.

use lao_crypto::{sign_message, ElectionKeyPair};
use lao_election::{canonical_order, registered_votes_digest, ElectionError};
use lao_messages::data::{
    AddChirp, CastVote, CloseRollCall, ConsensusElect, ConsensusKey, CreateLao, CreateRollCall,
    ElectionKey, ElectionSetup, ElectionVersion, EndElection, OpenElection, OpenRollCall, Vote,
    WitnessMessageSignature,
};
use lao_messages::{Data, MessageGeneral};
use lao_network::{join_tasks, ConnectionManager, Transport};
use lao_store::{Lao, SubscriptionStore};
use lao_types::{Channel, Clock, Hash, KeyPair, MessageId, PublicKey, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::context::{ClientState, Publication};
use crate::dispatcher::Dispatcher;
use crate::error::NodeError;
use crate::events::{EventBus, NodeEvent};
use crate::metrics::DispatchMetrics;
use crate::registry::HandlerRegistry;
use crate::retry::{Publisher, RetryScheduler};
use crate::scope::{LaoScopes, ScopeToken};

/// How often parked messages past their maximum age are dropped.
const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A protocol client: one key, a set of servers, and the LAOs it follows.
pub struct LaoClient {
    config: ClientConfig,
    keys: Arc<KeyPair>,
    state: Arc<ClientState>,
    events: Arc<EventBus>,
    metrics: Option<Arc<DispatchMetrics>>,
    network: Arc<ConnectionManager>,
    dispatcher: Arc<Dispatcher>,
    retries: Arc<RetryScheduler>,
    scopes: Arc<LaoScopes>,
    outbound: Mutex<Option<mpsc::UnboundedReceiver<Publication>>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LaoClient {
    /// Wire the client together. Nothing runs until [`LaoClient::start`].
    pub fn new(
        config: ClientConfig,
        keys: KeyPair,
        transport: Arc<dyn Transport>,
        subscriptions: Arc<dyn SubscriptionStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NodeError> {
        let events = Arc::new(EventBus::new());
        let metrics = if config.enable_metrics {
            Some(Arc::new(DispatchMetrics::new()?))
        } else {
            None
        };
        let state = Arc::new(ClientState::new(
            keys.public,
            config.witness_exempt.clone(),
            clock,
            Arc::clone(&events),
        ));
        let network = Arc::new(ConnectionManager::new(
            &config.network_config(),
            transport,
            subscriptions,
        ));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&state),
            HandlerRegistry::standard(),
            config.pending_capacity,
            config.channel_queue_depth,
            outbound_tx,
            metrics.clone(),
        ));
        let retries = Arc::new(RetryScheduler::new(
            Arc::clone(&network) as Arc<dyn Publisher>,
            config.retry_policy(),
            Arc::clone(&events),
            metrics.clone(),
        ));
        let (shutdown, _) = watch::channel(false);
        tracing::info!(
            public_key = %keys.public,
            servers = config.servers.len(),
            metrics = metrics.is_some(),
            "LAO client created"
        );
        Ok(Self {
            config,
            keys: Arc::new(keys),
            state,
            events,
            metrics,
            network,
            dispatcher,
            retries,
            scopes: Arc::new(LaoScopes::new()),
            outbound: Mutex::new(Some(outbound_rx)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Connect to every server and start the background tasks. Calling it
    /// again does nothing.
    pub async fn start(&self) -> Result<(), NodeError> {
        let Some(outbound) = self.outbound.lock().await.take() else {
            return Ok(());
        };
        let mut tasks = self.tasks.lock().await;

        // ── Inbound pump: connection manager → dispatcher ──────────────
        let mut inbound = self.network.observe_messages().await;
        let dispatcher = Arc::clone(&self.dispatcher);
        let mut shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    message = inbound.recv() => match message {
                        Some(m) => {
                            tracing::trace!(peer = %m.peer, channel = %m.channel, message_id = %m.message.message_id, "inbound");
                            dispatcher.submit(m.channel, m.message).await;
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!("inbound pump stopped");
        }));

        // ── Outbound pump: handler publications → retry scheduler ──────
        let keys = Arc::clone(&self.keys);
        let retries = Arc::clone(&self.retries);
        let scopes = Arc::clone(&self.scopes);
        let mut shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut outbound = outbound;
            loop {
                let publication = tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    p = outbound.recv() => match p {
                        Some(p) => p,
                        None => break,
                    },
                };
                let message = match MessageGeneral::new(&keys, &publication.data) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::error!(channel = %publication.channel, error = %e, "cannot sign publication");
                        continue;
                    }
                };
                let token = match publication.channel.lao_id() {
                    Some(lao) => scopes.token(&lao),
                    None => ScopeToken::detached(),
                };
                // The handle is dropped; failures surface as events.
                retries.schedule(publication.channel, message, token);
            }
            tracing::debug!("outbound pump stopped");
        }));

        // ── Election channels follow their setup ───────────────────────
        let mut events = self.events.stream();
        let network = Arc::clone(&self.network);
        let mut shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    e = events.recv() => e,
                };
                match event {
                    Ok(NodeEvent::ElectionChanged { lao, election }) => {
                        let channel = Channel::election(&lao, &election);
                        if network.subscriptions().load().is_ok_and(|s| s.contains(&channel)) {
                            continue;
                        }
                        if let Err(e) = follow(&network, &channel).await {
                            tracing::warn!(channel = %channel, error = %e, "cannot follow election channel");
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "election follower lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        // ── Pending sweep ──────────────────────────────────────────────
        let dispatcher = Arc::clone(&self.dispatcher);
        let max_age = self.config.pending_max_age_secs;
        let mut shutdown_rx = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(PENDING_SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        let dropped = dispatcher.clear_expired(max_age).await;
                        if dropped > 0 {
                            tracing::info!(dropped, max_age_secs = max_age, "expired parked messages");
                        }
                    }
                }
            }
        }));
        drop(tasks);

        self.network.start().await;
        tracing::info!("LAO client started");
        Ok(())
    }

    /// Stop the background tasks, cancel every LAO scope and close the
    /// connections.
    pub async fn shutdown(&self) {
        tracing::info!("LAO client stopping");
        self.shutdown.send_replace(true);
        self.scopes.teardown_all();
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        join_tasks(tasks, "client").await;
        self.network.shutdown().await;
        tracing::info!("LAO client stopped");
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn public_key(&self) -> PublicKey {
        self.keys.public
    }

    pub fn state(&self) -> &Arc<ClientState> {
        &self.state
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Metrics, when enabled in the config.
    pub fn metrics(&self) -> Option<&Arc<DispatchMetrics>> {
        self.metrics.as_ref()
    }

    pub fn network(&self) -> &ConnectionManager {
        &self.network
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The LAO as currently known.
    pub async fn lao(&self, id: &Hash) -> Option<Lao> {
        self.state.laos.get(id).await
    }

    fn now(&self) -> Timestamp {
        self.state.clock.now()
    }

    // ── Publishing ─────────────────────────────────────────────────────

    /// Sign `data`, publish it on `channel` and apply it locally. Returns
    /// once every server acknowledged.
    pub async fn publish(&self, channel: &Channel, data: impl Into<Data>) -> Result<MessageId, NodeError> {
        let message = MessageGeneral::new(&self.keys, &data.into())?;
        let id = message.message_id.clone();
        self.network.publish(channel, &message).await?;
        tracing::debug!(channel = %channel, message_id = %id, "published");
        self.dispatcher.submit(channel.clone(), message).await;
        Ok(id)
    }

    // ── LAOs ───────────────────────────────────────────────────────────

    /// Create a LAO organized by the local key and join it.
    pub async fn create_lao(&self, name: &str, witnesses: Vec<PublicKey>) -> Result<Hash, NodeError> {
        let create = CreateLao::new(name, self.now(), self.keys.public, witnesses);
        let id = create.id.clone();
        self.publish(&Channel::root(), create).await?;
        tracing::info!(lao = %id, name, "LAO created");
        self.join_lao(&id).await?;
        Ok(id)
    }

    /// Subscribe to the channels of a LAO and fetch their history. Returns
    /// how many messages the catch-up delivered.
    pub async fn join_lao(&self, lao: &Hash) -> Result<usize, NodeError> {
        // Opens the scope.
        self.scopes.token(lao);
        let mut delivered = 0;
        for channel in [
            Channel::lao(lao),
            Channel::consensus(lao),
            Channel::reactions(lao),
            Channel::social(lao, &self.keys.public),
        ] {
            delivered += follow(&self.network, &channel).await?;
        }
        tracing::info!(lao = %lao, delivered, "joined LAO");
        Ok(delivered)
    }

    /// Forget a LAO: cancel its pending publications, drop its parked
    /// messages and state, and unsubscribe its channels.
    pub async fn teardown_lao(&self, lao: &Hash) -> Result<(), NodeError> {
        self.scopes.teardown(lao);
        let parked = self.dispatcher.teardown(lao).await;
        let removed = self.state.remove_lao(lao).await;
        let channels: Vec<Channel> = self
            .network
            .subscriptions()
            .load()?
            .into_iter()
            .filter(|c| c.lao_id().as_ref() == Some(lao))
            .collect();
        for channel in &channels {
            self.network.unsubscribe(channel).await?;
        }
        tracing::info!(lao = %lao, parked, removed, channels = channels.len(), "LAO torn down");
        self.events.emit(NodeEvent::LaoTornDown { lao: lao.clone() });
        Ok(())
    }

    // ── Roll calls ─────────────────────────────────────────────────────

    /// Schedule a roll call. Returns its id.
    pub async fn create_roll_call(
        &self,
        lao: &Hash,
        name: &str,
        proposed_start: Timestamp,
        proposed_end: Timestamp,
        location: &str,
    ) -> Result<Hash, NodeError> {
        let create = CreateRollCall::new(lao, name, self.now(), proposed_start, proposed_end, location, None);
        let id = create.id.clone();
        self.publish(&Channel::lao(lao), Data::CreateRollCall(create)).await?;
        Ok(id)
    }

    /// Open (or reopen) the roll call whose latest transition is `id`.
    /// Returns the id of the new transition.
    pub async fn open_roll_call(&self, lao: &Hash, id: &Hash, reopen: bool) -> Result<Hash, NodeError> {
        let open = OpenRollCall::new(lao, id.clone(), self.now());
        let update_id = open.update_id.clone();
        let data = if reopen {
            Data::ReopenRollCall(open)
        } else {
            Data::OpenRollCall(open)
        };
        self.publish(&Channel::lao(lao), data).await?;
        Ok(update_id)
    }

    /// Close the roll call whose latest transition is `id`, registering
    /// `attendees`. Returns the id of the new transition.
    pub async fn close_roll_call(&self, lao: &Hash, id: &Hash, attendees: Vec<PublicKey>) -> Result<Hash, NodeError> {
        let close = CloseRollCall::new(lao, id.clone(), self.now(), attendees);
        let update_id = close.update_id.clone();
        self.publish(&Channel::lao(lao), Data::CloseRollCall(close)).await?;
        Ok(update_id)
    }

    // ── Elections ──────────────────────────────────────────────────────

    /// Set up an election. On a secret ballot the local client generates the
    /// election key, keeps the secret half to tally, and announces the
    /// public half.
    pub async fn setup_election(
        &self,
        lao: &Hash,
        name: &str,
        version: ElectionVersion,
        start: Timestamp,
        end: Timestamp,
        questions: Vec<(String, Vec<String>, bool)>,
    ) -> Result<Hash, NodeError> {
        let setup = ElectionSetup::new(lao.clone(), name, version, self.now(), start, end, questions);
        let id = setup.id.clone();
        let channel = Channel::election(lao, &id);
        follow(&self.network, &channel).await?;
        self.publish(&Channel::lao(lao), setup).await?;
        if version == ElectionVersion::SecretBallot {
            let keys = ElectionKeyPair::generate();
            self.state.elections.install_secret_key(&id, keys.secret).await;
            let key = ElectionKey {
                election: id.clone(),
                election_key: keys.public,
            };
            self.publish(&channel, key).await?;
        }
        tracing::info!(lao = %lao, election = %id, name, ?version, "election set up");
        Ok(id)
    }

    /// Open voting on an election.
    pub async fn open_election(&self, lao: &Hash, election: &Hash) -> Result<MessageId, NodeError> {
        let open = OpenElection {
            lao: lao.clone(),
            election: election.clone(),
            opened_at: self.now(),
        };
        self.publish(&Channel::election(lao, election), open).await
    }

    /// Cast one ballot option index per question. Secret ballots are
    /// encrypted under the announced election key.
    pub async fn cast_vote(
        &self,
        lao: &Hash,
        election: &Hash,
        choices: &[(Hash, u16)],
    ) -> Result<MessageId, NodeError> {
        let current = self
            .state
            .elections
            .get(lao, election)
            .await
            .ok_or_else(|| ElectionError::UnknownElection(election.clone()))?;
        let mut votes = Vec::with_capacity(choices.len());
        for (question, index) in choices {
            let vote = if current.is_secret_ballot() {
                let key = current
                    .election_key
                    .ok_or_else(|| ElectionError::MissingKey(election.clone()))?;
                let ciphertext = key.encrypt_vote_index(*index).map_err(ElectionError::from)?;
                Vote::encrypted(election, question, ciphertext)
            } else {
                Vote::open(election, question, *index)
            };
            votes.push(vote);
        }
        let cast = CastVote {
            lao: lao.clone(),
            election: election.clone(),
            created_at: self.now(),
            votes,
        };
        self.publish(&Channel::election(lao, election), cast).await
    }

    /// End the election, announcing the digest of the votes counted locally.
    pub async fn end_election(&self, lao: &Hash, election: &Hash) -> Result<MessageId, NodeError> {
        let current = self
            .state
            .elections
            .get(lao, election)
            .await
            .ok_or_else(|| ElectionError::UnknownElection(election.clone()))?;
        let ordered = canonical_order(current.counted_votes());
        let end = EndElection {
            lao: lao.clone(),
            election: election.clone(),
            created_at: self.now(),
            registered_votes: registered_votes_digest(&ordered),
        };
        self.publish(&Channel::election(lao, election), end).await
    }

    // ── Consensus ──────────────────────────────────────────────────────

    /// Propose `value` for `key`. Returns the elect's message id.
    pub async fn propose_elect(&self, lao: &Hash, key: ConsensusKey, value: &str) -> Result<MessageId, NodeError> {
        let elect = ConsensusElect::new(key, value, self.now());
        self.publish(&Channel::consensus(lao), elect).await
    }

    /// Answer an elect as one of its nodes.
    pub async fn answer_elect(&self, lao: &Hash, elect: &MessageId, accept: bool) -> Result<MessageId, NodeError> {
        let answer = self.state.consensus.lock().await.local_answer(elect, accept)?;
        self.publish(&Channel::consensus(lao), answer).await
    }

    // ── Witnessing ─────────────────────────────────────────────────────

    /// Countersign a message of the LAO as one of its witnesses.
    pub async fn witness_message(&self, lao: &Hash, message_id: &MessageId) -> Result<MessageId, NodeError> {
        let witness = WitnessMessageSignature {
            message_id: message_id.clone(),
            signature: sign_message(message_id.as_bytes(), &self.keys.private),
        };
        self.publish(&Channel::lao(lao), witness).await
    }

    // ── Social ─────────────────────────────────────────────────────────

    /// Post on the local user's social channel.
    pub async fn add_chirp(&self, lao: &Hash, text: &str, parent_id: Option<MessageId>) -> Result<MessageId, NodeError> {
        let chirp = AddChirp {
            text: text.to_string(),
            parent_id,
            timestamp: self.now(),
        };
        self.publish(&Channel::social(lao, &self.keys.public), chirp).await
    }
}

/// Subscribe to `channel` and fetch its history.
async fn follow(network: &ConnectionManager, channel: &Channel) -> Result<usize, NodeError> {
    network.subscribe(channel).await?;
    Ok(network.catchup(channel).await?)
}
