//! Inbound message pipeline.
//!
//! Every message goes through the same steps: envelope checks, payload
//! decoding, routing, duplicate check, the handler, then the message log and
//! witnessing. Messages of one channel are applied in arrival order by a
//! dedicated worker; different channels run concurrently.
//!
//! A handler that fails on a missing fact (an unknown LAO, election, roll
//! call, elect or message) parks the message in the [`PendingQueue`]. When a
//! later message makes that fact known, the parked messages go back to their
//! channel's worker in the order they were parked, ahead of newer
//! submissions.

use lao_messages::{MessageGeneral, ObjectAction};
use lao_types::{Channel, Hash, RecentMap};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::context::{ClientState, HandlerContext, Publication};
use crate::error::DataHandlingError;
use crate::events::NodeEvent;
use crate::handlers::{apply_witness_signature, promote, register_for_witnessing};
use crate::metrics::DispatchMetrics;
use crate::pending::{PendingEntry, PendingQueue};
use crate::registry::HandlerRegistry;

/// Result of a message that got through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    Applied {
        pair: ObjectAction,
        /// Ids now known, including the message's own id.
        satisfied: Vec<Hash>,
        publications: Vec<Publication>,
    },
    /// Already applied; nothing changed.
    Duplicate,
}

struct Queued {
    message: MessageGeneral,
    /// The dependency whose arrival released this delivery.
    released_by: Option<Hash>,
}

/// How many satisfied ids are remembered for parking races.
pub const KNOWN_CAPACITY: usize = 65_536;

struct PendingState {
    queue: PendingQueue,
    /// Recently satisfied ids, tagged with the LAO of the channel that
    /// satisfied them. Checked when parking so a dependency satisfied while
    /// the message was failing does not strand it.
    known: RecentMap<Hash, Option<Hash>>,
}

/// Both inputs of a channel worker.
#[derive(Clone)]
struct Worker {
    /// New messages, bounded by the configured queue depth.
    submit: mpsc::Sender<Queued>,
    /// Released messages. Unbounded so a worker can push into its own queue,
    /// and drained before `submit`.
    redeliver: mpsc::UnboundedSender<Queued>,
}

/// Routes inbound messages through the handlers, one FIFO worker per channel.
pub struct Dispatcher {
    state: Arc<ClientState>,
    registry: HandlerRegistry,
    pending: Mutex<PendingState>,
    workers: Mutex<HashMap<Channel, Worker>>,
    queue_depth: usize,
    outbound: mpsc::UnboundedSender<Publication>,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl Dispatcher {
    /// Build a dispatcher. Publications produced by handlers go to
    /// `outbound`; at most `pending_capacity` messages are parked at once.
    pub fn new(
        state: Arc<ClientState>,
        registry: HandlerRegistry,
        pending_capacity: usize,
        queue_depth: usize,
        outbound: mpsc::UnboundedSender<Publication>,
        metrics: Option<Arc<DispatchMetrics>>,
    ) -> Self {
        Self {
            state,
            registry,
            pending: Mutex::new(PendingState {
                queue: PendingQueue::new(pending_capacity),
                known: RecentMap::new(KNOWN_CAPACITY),
            }),
            workers: Mutex::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
            outbound,
            metrics,
        }
    }

    /// The state the handlers apply messages to.
    pub fn state(&self) -> &Arc<ClientState> {
        &self.state
    }

    /// Run one message through the pipeline, without parking or publishing.
    pub async fn handle(
        &self,
        channel: &Channel,
        message: &MessageGeneral,
    ) -> Result<HandleOutcome, DataHandlingError> {
        message.verify()?;
        let (valid, invalid) = message.partition_witness_signatures();
        for ws in &invalid {
            tracing::warn!(
                message_id = %message.message_id,
                witness = %ws.witness,
                "dropping invalid witness signature"
            );
        }
        let data = message.decode_data()?;
        let pair = data.object_action();
        let handler = self.registry.get(pair)?;
        if self.state.messages.contains(&message.message_id).await {
            return Ok(HandleOutcome::Duplicate);
        }

        let ctx = HandlerContext {
            message_id: message.message_id.clone(),
            sender: message.sender,
            channel: channel.clone(),
            lao_id: channel.lao_id(),
            witness_signatures: valid.clone(),
            local: self.state.local,
            now: self.state.clock.now(),
        };
        let output = handler.handle(&self.state, &ctx, data).await?;

        // Witness signatures are attached one by one below.
        let mut stored = message.clone();
        stored.witness_signatures.clear();
        if !self.state.messages.insert(channel, stored).await {
            return Ok(HandleOutcome::Duplicate);
        }

        let lao_id = output
            .witness
            .as_ref()
            .map(|w| w.lao.clone())
            .or_else(|| ctx.lao_id.clone());
        if !self.state.policy.is_exempt(pair) {
            if let Some(promotion) = register_for_witnessing(&self.state, &ctx, pair, output.witness.clone()).await {
                promote(&self.state, promotion).await;
            }
        }
        if let Some(lao) = match &lao_id {
            Some(id) => self.state.laos.get(id).await,
            None => None,
        } {
            for ws in valid {
                if !lao.is_witness(&ws.witness) {
                    tracing::debug!(message_id = %ctx.message_id, signer = %ws.witness, "signature by a non-witness ignored");
                    continue;
                }
                if let Err(e) = apply_witness_signature(&self.state, &ctx.message_id, ws).await {
                    tracing::warn!(message_id = %ctx.message_id, error = %e, "cannot apply attached witness signature");
                }
            }
        }

        let mut satisfied = output.satisfied;
        satisfied.push(ctx.message_id.clone().into());
        tracing::debug!(channel = %channel, message_id = %ctx.message_id, pair = %pair, "message applied");
        Ok(HandleOutcome::Applied {
            pair,
            satisfied,
            publications: output.publications,
        })
    }

    /// Queue a message on its channel's worker.
    pub async fn submit(self: &Arc<Self>, channel: Channel, message: MessageGeneral) {
        self.enqueue(channel, Queued { message, released_by: None }).await;
    }

    async fn enqueue(self: &Arc<Self>, channel: Channel, queued: Queued) {
        let worker = self.worker(&channel).await;
        if worker.submit.send(queued).await.is_err() {
            tracing::debug!(channel = %channel, "channel worker gone, message dropped");
        }
    }

    async fn worker(self: &Arc<Self>, channel: &Channel) -> Worker {
        let mut workers = self.workers.lock().await;
        match workers.get(channel) {
            Some(worker) if !worker.submit.is_closed() => worker.clone(),
            _ => {
                let (submit, submissions) = mpsc::channel(self.queue_depth);
                let (redeliver, redeliveries) = mpsc::unbounded_channel();
                tokio::spawn(Arc::clone(self).run_worker(channel.clone(), submissions, redeliveries));
                let worker = Worker { submit, redeliver };
                workers.insert(channel.clone(), worker.clone());
                worker
            }
        }
    }

    // Boxed with an explicit `Send` bound to break the recursive
    // worker -> run_worker -> redeliver -> worker auto-trait cycle.
    fn run_worker(
        self: Arc<Self>,
        channel: Channel,
        mut submissions: mpsc::Receiver<Queued>,
        mut redeliveries: mpsc::UnboundedReceiver<Queued>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            tracing::trace!(channel = %channel, "channel worker started");
            loop {
                let queued = tokio::select! {
                    biased;
                    Some(queued) = redeliveries.recv() => queued,
                    Some(queued) = submissions.recv() => queued,
                    else => break,
                };
                self.process(&channel, queued).await;
            }
            tracing::trace!(channel = %channel, "channel worker stopped");
        })
    }

    async fn process(self: &Arc<Self>, channel: &Channel, queued: Queued) {
        if let Some(m) = &self.metrics {
            m.messages_received.inc();
        }
        let message_id = queued.message.message_id.clone();
        match self.handle(channel, &queued.message).await {
            Ok(HandleOutcome::Applied {
                pair,
                satisfied,
                publications,
            }) => {
                if let Some(m) = &self.metrics {
                    m.messages_handled.inc();
                }
                self.state.events.emit(NodeEvent::MessageApplied {
                    channel: channel.clone(),
                    message_id,
                    pair,
                });
                for publication in publications {
                    if self.outbound.send(publication).is_err() {
                        tracing::warn!(channel = %channel, "outbound queue closed, publication dropped");
                    }
                }
                self.release(channel, satisfied).await;
            }
            Ok(HandleOutcome::Duplicate) => {
                if let Some(m) = &self.metrics {
                    m.messages_duplicate.inc();
                }
                tracing::trace!(channel = %channel, message_id = %message_id, "duplicate message");
            }
            Err(e) => match e.dependency() {
                Some(dependency) => self.park(channel, queued, dependency, e).await,
                None => self.reject(channel, &message_id, &e),
            },
        }
    }

    async fn park(self: &Arc<Self>, channel: &Channel, queued: Queued, dependency: Hash, error: DataHandlingError) {
        let message_id = queued.message.message_id.clone();
        let mut pending = self.pending.lock().await;
        if pending.known.contains(&dependency) {
            if queued.released_by.as_ref() == Some(&dependency) {
                drop(pending);
                // The fact is known and the message still fails on it.
                self.reject(channel, &message_id, &error);
                return;
            }
            // Still under the lock, so it cannot overtake a release in flight.
            self.redeliver(channel, queued.message, dependency).await;
            return;
        }
        let entry = PendingEntry {
            channel: channel.clone(),
            message: queued.message,
            parked_at: self.state.clock.now(),
        };
        if !pending.queue.insert(dependency.clone(), entry) {
            drop(pending);
            tracing::warn!(channel = %channel, message_id = %message_id, "pending queue full");
            self.reject(channel, &message_id, &error);
            return;
        }
        let parked = pending.queue.len();
        drop(pending);

        tracing::debug!(
            channel = %channel,
            message_id = %message_id,
            dependency = %dependency,
            reason = %error,
            "message parked"
        );
        if let Some(m) = &self.metrics {
            m.messages_parked.inc();
            m.pending.set(parked as i64);
        }
        self.state.events.emit(NodeEvent::MessageParked {
            channel: channel.clone(),
            message_id,
            dependency,
        });
    }

    fn reject(&self, channel: &Channel, message_id: &lao_types::MessageId, error: &DataHandlingError) {
        tracing::warn!(channel = %channel, message_id = %message_id, error = %error, "message rejected");
        if let Some(m) = &self.metrics {
            m.messages_rejected.inc();
        }
        self.state.events.emit(NodeEvent::MessageRejected {
            channel: channel.clone(),
            message_id: message_id.clone(),
            reason: error.to_string(),
        });
    }

    /// Mark `satisfied` as known and hand every message waiting on it back to
    /// its channel, in parking order. The pushes happen under the pending
    /// lock so a message parked later cannot overtake them.
    async fn release(self: &Arc<Self>, channel: &Channel, satisfied: Vec<Hash>) {
        let lao = channel.lao_id();
        let mut pending = self.pending.lock().await;
        let released = pending.queue.take_all(&satisfied);
        for id in satisfied {
            pending.known.insert(id, lao.clone());
        }
        if released.is_empty() {
            return;
        }
        if let Some(m) = &self.metrics {
            m.pending.set(pending.queue.len() as i64);
        }
        for (dependency, entry) in released {
            tracing::debug!(
                channel = %entry.channel,
                message_id = %entry.message.message_id,
                dependency = %dependency,
                "releasing parked message"
            );
            self.redeliver(&entry.channel, entry.message, dependency).await;
        }
    }

    /// Push onto the channel's redelivery queue. Never waits on queue space,
    /// so it is safe from the target channel's own worker.
    async fn redeliver(self: &Arc<Self>, channel: &Channel, message: MessageGeneral, dependency: Hash) {
        let queued = Queued {
            message,
            released_by: Some(dependency),
        };
        if self.worker(channel).await.redeliver.send(queued).is_err() {
            tracing::debug!(channel = %channel, "channel worker gone, released message dropped");
        }
    }

    /// Drop parked messages older than `max_age_secs`.
    pub async fn clear_expired(&self, max_age_secs: i64) -> usize {
        let now = self.state.clock.now();
        let (removed, parked) = {
            let mut pending = self.pending.lock().await;
            let removed = pending.queue.clear_expired(max_age_secs, now);
            (removed, pending.queue.len())
        };
        if removed > 0 {
            tracing::info!(removed, "expired parked messages dropped");
            if let Some(m) = &self.metrics {
                m.pending.set(parked as i64);
            }
        }
        removed
    }

    /// Number of parked messages.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.queue.len()
    }

    /// Whether `message_id` is waiting on a dependency.
    pub async fn is_parked(&self, message_id: &lao_types::MessageId) -> bool {
        self.pending.lock().await.queue.is_waiting(message_id)
    }

    /// Number of satisfied ids remembered for parking races.
    pub async fn known_len(&self) -> usize {
        self.pending.lock().await.known.len()
    }

    /// Stop the LAO's channel workers, drop its parked messages and forget
    /// the ids its channels satisfied.
    pub async fn teardown(&self, lao: &Hash) -> usize {
        self.workers
            .lock()
            .await
            .retain(|channel, _| channel.lao_id().as_ref() != Some(lao));
        let mut pending = self.pending.lock().await;
        let removed = pending.queue.remove_lao(lao);
        pending
            .known
            .remove_where(|id, tagged| id == lao || tagged.as_ref() == Some(lao));
        if let Some(m) = &self.metrics {
            m.pending.set(pending.queue.len() as i64);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use lao_crypto::generate_keypair;
    use lao_messages::data::{
        AddChirp, CastVote, CreateLao, CreateRollCall, ElectionSetup, ElectionVersion, OpenElection, OpenRollCall,
        UpdateLao, Vote,
    };
    use lao_messages::{Data, WitnessSignature};
    use lao_types::{Clock, KeyPair, SystemClock, Timestamp};
    use lao_witness::WitnessPolicy;
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        outbound: mpsc::UnboundedReceiver<Publication>,
        events: broadcast::Receiver<NodeEvent>,
        organizer: KeyPair,
    }

    fn harness() -> Harness {
        let organizer = generate_keypair();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let events = Arc::new(EventBus::new());
        let stream = events.stream();
        let state = Arc::new(ClientState::new(organizer.public, WitnessPolicy::default(), clock, events));
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(DispatchMetrics::new().unwrap());
        let dispatcher = Arc::new(Dispatcher::new(state, HandlerRegistry::standard(), 16, 8, tx, Some(metrics)));
        Harness {
            dispatcher,
            outbound: rx,
            events: stream,
            organizer,
        }
    }

    fn create_lao(organizer: &KeyPair, witnesses: Vec<lao_types::PublicKey>) -> (CreateLao, MessageGeneral) {
        let create = CreateLao::new("LAO", Timestamp::new(1_000), organizer.public, witnesses);
        let message = MessageGeneral::new(organizer, &Data::CreateLao(create.clone())).unwrap();
        (create, message)
    }

    async fn next_matching(
        events: &mut broadcast::Receiver<NodeEvent>,
        pred: impl Fn(&NodeEvent) -> bool,
    ) -> NodeEvent {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = events.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn applied_message_satisfies_its_own_id() {
        let h = harness();
        let (create, message) = create_lao(&h.organizer, vec![]);
        let outcome = h.dispatcher.handle(&Channel::root(), &message).await.unwrap();
        match outcome {
            HandleOutcome::Applied { pair, satisfied, .. } => {
                assert_eq!(pair.to_string(), "lao#create");
                assert!(satisfied.contains(&create.id));
                assert!(satisfied.contains(&message.message_id.clone().into()));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            h.dispatcher.handle(&Channel::root(), &message).await.unwrap(),
            HandleOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn tampered_message_is_rejected() {
        let h = harness();
        let (_, mut message) = create_lao(&h.organizer, vec![]);
        message.sender = generate_keypair().public;
        let err = h.dispatcher.handle(&Channel::root(), &message).await.unwrap_err();
        assert!(!err.is_recoverable());
        assert!(h.dispatcher.state().laos.is_empty().await);
    }

    #[tokio::test]
    async fn parked_message_is_released_when_dependency_arrives() {
        let mut h = harness();
        let (create, create_msg) = create_lao(&h.organizer, vec![]);
        let lao_channel = Channel::lao(&create.id);
        let rc = CreateRollCall::new(
            &create.id,
            "Entry",
            Timestamp::new(1_100),
            Timestamp::new(1_200),
            Timestamp::new(1_900),
            "Hall",
            None,
        );
        let open = OpenRollCall::new(&create.id, rc.id.clone(), Timestamp::new(1_200));
        let open_msg = MessageGeneral::new(&h.organizer, &Data::OpenRollCall(open.clone())).unwrap();
        let rc_msg = MessageGeneral::new(&h.organizer, &Data::CreateRollCall(rc.clone())).unwrap();

        // Open first, then create, then the LAO itself.
        h.dispatcher.submit(lao_channel.clone(), open_msg.clone()).await;
        next_matching(&mut h.events, |e| matches!(e, NodeEvent::MessageParked { .. })).await;
        h.dispatcher.submit(lao_channel.clone(), rc_msg).await;
        next_matching(&mut h.events, |e| matches!(e, NodeEvent::MessageParked { .. })).await;
        assert_eq!(h.dispatcher.pending_len().await, 2);

        h.dispatcher.submit(Channel::root(), create_msg).await;
        next_matching(&mut h.events, |e| {
            matches!(e, NodeEvent::MessageApplied { message_id, .. } if *message_id == open_msg.message_id)
        })
        .await;

        let stored = h.dispatcher.state().roll_calls.get(&create.id, &rc.id).await.unwrap();
        assert_eq!(stored.id, open.update_id);
        assert_eq!(h.dispatcher.pending_len().await, 0);
    }

    #[tokio::test]
    async fn terminal_error_emits_rejection() {
        let mut h = harness();
        let (create, create_msg) = create_lao(&h.organizer, vec![]);
        h.dispatcher.handle(&Channel::root(), &create_msg).await.unwrap();
        let intruder = generate_keypair();
        let update = UpdateLao {
            id: create.id.clone(),
            name: "Mine".into(),
            last_modified: Timestamp::new(2_000),
            witnesses: vec![],
        };
        let msg = MessageGeneral::new(&intruder, &Data::UpdateLao(update)).unwrap();
        h.dispatcher.submit(Channel::lao(&create.id), msg.clone()).await;
        let event = next_matching(&mut h.events, |e| matches!(e, NodeEvent::MessageRejected { .. })).await;
        assert!(matches!(event, NodeEvent::MessageRejected { message_id, .. } if message_id == msg.message_id));
    }

    #[tokio::test]
    async fn attached_witness_signatures_promote() {
        let h = harness();
        let witness = generate_keypair();
        let (create, mut message) = create_lao(&h.organizer, vec![witness.public]);
        message.witness_signatures.push(WitnessSignature::sign(&message.message_id, &witness.private));
        h.dispatcher.handle(&Channel::root(), &message).await.unwrap();

        let lao = h.dispatcher.state().laos.get(&create.id).await.unwrap();
        assert!(lao.witnessed);
        let stored = h.dispatcher.state().messages.get(&message.message_id).await.unwrap();
        assert_eq!(stored.message.witness_signatures.len(), 1);
    }

    #[tokio::test]
    async fn learn_is_sent_outbound() {
        let mut h = harness();
        let (create, create_msg) = create_lao(&h.organizer, vec![]);
        h.dispatcher.handle(&Channel::root(), &create_msg).await.unwrap();
        let elect = lao_messages::data::ConsensusElect::new(
            lao_messages::data::ConsensusKey {
                object_type: "roll_call".into(),
                id: Hash::from_bytes([3u8; 32]),
                property: "state".into(),
            },
            "started",
            Timestamp::new(1_500),
        );
        let msg = MessageGeneral::new(&h.organizer, &Data::ConsensusElect(elect)).unwrap();
        h.dispatcher.submit(Channel::consensus(&create.id), msg).await;
        let publication = tokio::time::timeout(Duration::from_secs(2), h.outbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(publication.channel, Channel::consensus(&create.id));
        assert!(matches!(publication.data, Data::ConsensusLearn(_)));
    }

    #[tokio::test]
    async fn teardown_drops_parked_messages() {
        let mut h = harness();
        let lao = Hash::from_bytes([4u8; 32]);
        let chirp = Data::AddChirp(AddChirp {
            text: "early".into(),
            parent_id: None,
            timestamp: Timestamp::new(5),
        });
        let alice = generate_keypair();
        let update = MessageGeneral::new(
            &h.organizer,
            &Data::UpdateLao(UpdateLao {
                id: lao.clone(),
                name: "x".into(),
                last_modified: Timestamp::new(5),
                witnesses: vec![],
            }),
        )
        .unwrap();
        h.dispatcher.submit(Channel::lao(&lao), update).await;
        next_matching(&mut h.events, |e| matches!(e, NodeEvent::MessageParked { .. })).await;
        let chirp_msg = MessageGeneral::new(&alice, &chirp).unwrap();
        // Chirps do not wait on the LAO, they are simply stored.
        h.dispatcher.submit(Channel::social(&lao, &alice.public), chirp_msg).await;
        next_matching(&mut h.events, |e| matches!(e, NodeEvent::MessageApplied { .. })).await;

        assert_eq!(h.dispatcher.teardown(&lao).await, 1);
        assert_eq!(h.dispatcher.pending_len().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn released_messages_keep_their_channel_order() {
        for _ in 0..50 {
            let mut h = harness();
            let (create, create_msg) = create_lao(&h.organizer, vec![]);
            h.dispatcher.handle(&Channel::root(), &create_msg).await.unwrap();
            let setup = ElectionSetup::new(
                create.id.clone(),
                "Board",
                ElectionVersion::OpenBallot,
                Timestamp::new(1_000),
                Timestamp::new(1_000),
                Timestamp::new(2_000),
                vec![("Approve?".into(), vec!["yes".into(), "no".into()], false)],
            );
            let question = setup.questions[0].id.clone();
            let election_channel = Channel::election(&create.id, &setup.id);
            let open = MessageGeneral::new(
                &h.organizer,
                &Data::OpenElection(OpenElection {
                    lao: create.id.clone(),
                    election: setup.id.clone(),
                    opened_at: Timestamp::new(1_100),
                }),
            )
            .unwrap();
            let voter = generate_keypair();
            let cast = MessageGeneral::new(
                &voter,
                &Data::CastVote(CastVote {
                    lao: create.id.clone(),
                    election: setup.id.clone(),
                    created_at: Timestamp::new(1_200),
                    votes: vec![Vote::open(&setup.id, &question, 0)],
                }),
            )
            .unwrap();

            h.dispatcher.submit(election_channel.clone(), open.clone()).await;
            h.dispatcher.submit(election_channel.clone(), cast.clone()).await;
            for _ in 0..2 {
                next_matching(&mut h.events, |e| matches!(e, NodeEvent::MessageParked { .. })).await;
            }

            let setup_msg = MessageGeneral::new(&h.organizer, &Data::ElectionSetup(setup.clone())).unwrap();
            h.dispatcher.submit(Channel::lao(&create.id), setup_msg).await;
            let event = next_matching(&mut h.events, |e| match e {
                NodeEvent::MessageApplied { message_id, .. } | NodeEvent::MessageRejected { message_id, .. } => {
                    *message_id == cast.message_id
                }
                _ => false,
            })
            .await;
            assert!(matches!(event, NodeEvent::MessageApplied { .. }), "{event:?}");

            let election = h.dispatcher.state().elections.get(&create.id, &setup.id).await.unwrap();
            assert_eq!(election.counted_votes().count(), 1);
        }
    }

    #[tokio::test]
    async fn teardown_forgets_satisfied_ids() {
        let h = harness();
        let (create, create_msg) = create_lao(&h.organizer, vec![]);
        let other = generate_keypair();
        let (other_create, other_msg) = create_lao(&other, vec![]);
        h.dispatcher.submit(Channel::root(), create_msg).await;
        h.dispatcher.submit(Channel::root(), other_msg).await;
        let rc = CreateRollCall::new(
            &create.id,
            "Entry",
            Timestamp::new(1_100),
            Timestamp::new(1_200),
            Timestamp::new(1_900),
            "Hall",
            None,
        );
        let rc_msg = MessageGeneral::new(&h.organizer, &Data::CreateRollCall(rc)).unwrap();
        h.dispatcher.submit(Channel::lao(&create.id), rc_msg.clone()).await;
        let rc_id: Hash = rc_msg.message_id.clone().into();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                {
                    let pending = h.dispatcher.pending.lock().await;
                    if pending.known.contains(&rc_id) && pending.known.contains(&other_create.id) {
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        let before = h.dispatcher.known_len().await;

        h.dispatcher.teardown(&create.id).await;
        let after = h.dispatcher.known_len().await;
        assert!(after < before, "{after} >= {before}");
        // The other LAO's id is still known.
        assert!(h.dispatcher.pending.lock().await.known.contains(&other_create.id));
        assert!(!h.dispatcher.pending.lock().await.known.contains(&create.id));
    }
}
