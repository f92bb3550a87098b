//! State the handlers work against, and what a handler gets and returns.

use lao_consensus::ConsensusEngine;
use lao_election::ElectionEngine;
use lao_messages::{Data, WitnessSignature};
use lao_store::{EntityKey, KeyedRepository, Lao, Meeting, MessageRepository, RollCallStore, SocialStore};
use lao_types::{Channel, Clock, Hash, MessageId, PublicKey, Timestamp};
use lao_witness::{WitnessEngine, WitnessPolicy, WitnessSubject};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::DataHandlingError;
use crate::events::EventBus;

/// Every repository and engine of one client. Built once by the client and
/// shared by reference; there is no global state.
pub struct ClientState {
    pub laos: KeyedRepository<Hash, Lao>,
    pub meetings: KeyedRepository<EntityKey, Meeting>,
    pub roll_calls: RollCallStore,
    pub social: SocialStore,
    /// Every applied message.
    pub messages: MessageRepository,
    pub elections: ElectionEngine,
    pub consensus: Mutex<ConsensusEngine>,
    pub witness: Mutex<WitnessEngine>,
    /// Payloads that skip witnessing.
    pub policy: WitnessPolicy,
    /// The client's own key.
    pub local: PublicKey,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<EventBus>,
}

impl ClientState {
    pub fn new(local: PublicKey, policy: WitnessPolicy, clock: Arc<dyn Clock>, events: Arc<EventBus>) -> Self {
        Self {
            laos: KeyedRepository::new("lao"),
            meetings: KeyedRepository::new("meeting"),
            roll_calls: RollCallStore::new(),
            social: SocialStore::new(),
            messages: MessageRepository::new(),
            elections: ElectionEngine::new(),
            consensus: Mutex::new(ConsensusEngine::new(local)),
            witness: Mutex::new(WitnessEngine::new()),
            policy,
            local,
            clock,
            events,
        }
    }

    /// The LAO, or a dependency error if it has not been created yet.
    pub async fn lao(&self, id: &Hash) -> Result<Lao, DataHandlingError> {
        self.laos
            .get(id)
            .await
            .ok_or_else(|| DataHandlingError::UnknownLao(id.clone()))
    }

    /// Drop everything held about `lao`. Returns how many entries went.
    pub async fn remove_lao(&self, lao: &Hash) -> usize {
        let mut removed = 0;
        removed += self.witness.lock().await.teardown(lao);
        removed += self.consensus.lock().await.teardown(lao);
        removed += self.elections.teardown(lao).await;
        removed += self.roll_calls.remove_lao(lao).await;
        removed += self.meetings.retain(|k| k.lao != *lao).await;
        self.social.remove_lao(lao).await;
        removed += self.messages.remove_lao(lao).await;
        if self.laos.remove(lao).await.is_some() {
            removed += 1;
        }
        removed
    }
}

/// Envelope facts of the message being handled.
#[derive(Clone, Debug)]
pub struct HandlerContext {
    pub message_id: MessageId,
    pub sender: PublicKey,
    /// Channel the message arrived on.
    pub channel: Channel,
    /// LAO the channel belongs to; `None` on the root channel.
    pub lao_id: Option<Hash>,
    /// Witness signatures that verified.
    pub witness_signatures: Vec<WitnessSignature>,
    pub local: PublicKey,
    /// Local time when handling started.
    pub now: Timestamp,
}

impl HandlerContext {
    /// The LAO of the channel. Payloads that only make sense inside a LAO
    /// fail on the root channel.
    pub fn require_lao(&self) -> Result<&Hash, DataHandlingError> {
        self.lao_id
            .as_ref()
            .ok_or_else(|| DataHandlingError::WrongChannel(self.channel.to_string()))
    }

    /// Fail unless the message arrived on exactly `expected`.
    pub fn require_channel(&self, expected: &Channel) -> Result<(), DataHandlingError> {
        if self.channel != *expected {
            return Err(DataHandlingError::WrongChannel(format!(
                "{} (expected {expected})",
                self.channel
            )));
        }
        Ok(())
    }

    /// Fail unless the sender is the organizer of `lao`.
    pub fn require_organizer(&self, lao: &Lao, action: &str) -> Result<(), DataHandlingError> {
        if !lao.is_organizer(&self.sender) {
            return Err(DataHandlingError::Unauthorized {
                sender: self.sender,
                action: action.to_string(),
            });
        }
        Ok(())
    }
}

/// A message a handler wants published, signed by the local key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    pub channel: Channel,
    pub data: Data,
}

/// How a handled message is registered for witnessing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessRequest {
    pub lao: Hash,
    /// What gets promoted once witnessed.
    pub subject: WitnessSubject,
    pub title: String,
    pub description: String,
}

impl WitnessRequest {
    pub fn new(lao: &Hash, subject: WitnessSubject, title: impl Into<String>) -> Self {
        Self {
            lao: lao.clone(),
            subject,
            title: title.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// What a handler produced besides its state transition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HandlerOutput {
    /// Messages to sign and publish.
    pub publications: Vec<Publication>,
    /// Ids now known, releasing messages parked on them. The message's own
    /// id is added by the dispatcher.
    pub satisfied: Vec<Hash>,
    /// Overrides the default witnessing entry (subject `Message`, in the
    /// channel's LAO).
    pub witness: Option<WitnessRequest>,
}

impl HandlerOutput {
    /// Nothing beyond the state change.
    pub fn none() -> Self {
        Self::default()
    }

    /// Release what is parked on `id`.
    pub fn satisfies(mut self, id: &Hash) -> Self {
        self.satisfied.push(id.clone());
        self
    }

    pub fn publish(mut self, channel: Channel, data: impl Into<Data>) -> Self {
        self.publications.push(Publication {
            channel,
            data: data.into(),
        });
        self
    }

    pub fn witnessed_as(mut self, request: WitnessRequest) -> Self {
        self.witness = Some(request);
        self
    }
}
