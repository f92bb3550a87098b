//! All consensus instances known to this client.
//!
//! Instances are stored under the id of their elect message. For each
//! instance id one instance is "live": the newest non-superseded elect.
//! Older or late elects are kept, as `Failed`, so later references to them
//! resolve.

use lao_messages::data::consensus::LearnValue;
use lao_messages::data::{ConsensusElect, ConsensusElectAccept, ConsensusFailure, ConsensusLearn};
use lao_types::{Channel, Hash, MessageId, PublicKey, Timestamp};
use std::collections::{BTreeSet, HashMap};

use crate::instance::{AcceptResult, ElectInstance, InstanceState};
use crate::ConsensusError;

/// Envelope facts of an incoming elect.
#[derive(Clone, Debug)]
pub struct ElectContext {
    pub message_id: MessageId,
    pub channel: Channel,
    pub sender: PublicKey,
    /// Consensus nodes of the LAO at the time of the elect.
    pub nodes: BTreeSet<PublicKey>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ElectOutcome {
    /// Already known.
    Duplicate,
    /// The elect is the live instance for its id. `superseded` is the elect it
    /// replaced, `learn` is set when the proposer's own acceptance decided it
    /// and the local node is the proposer.
    Started {
        superseded: Option<MessageId>,
        learn: Option<ConsensusLearn>,
    },
    /// Stored as failed: older than the live elect, or the live instance is
    /// already accepted.
    Stale,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptOutcome {
    Ignored,
    Counted,
    Refused,
    /// Quorum reached. `learn` is what the local proposer must publish.
    Accepted { learn: Option<ConsensusLearn> },
}

pub struct ConsensusEngine {
    local: PublicKey,
    instances: HashMap<MessageId, ElectInstance>,
    live: HashMap<Hash, MessageId>,
}

impl ConsensusEngine {
    pub fn new(local: PublicKey) -> Self {
        Self {
            local,
            instances: HashMap::new(),
            live: HashMap::new(),
        }
    }

    pub fn handle_elect(
        &mut self,
        ctx: ElectContext,
        elect: &ConsensusElect,
        now: Timestamp,
    ) -> ElectOutcome {
        if self.instances.contains_key(&ctx.message_id) {
            return ElectOutcome::Duplicate;
        }
        let mut instance = ElectInstance::new(
            ctx.message_id.clone(),
            ctx.channel,
            ctx.sender,
            elect.key.clone(),
            elect.value.clone(),
            elect.created_at,
            ctx.nodes,
        );
        let instance_id = instance.instance_id.clone();

        let mut superseded = None;
        if let Some(live) = self.live.get(&instance_id).and_then(|id| self.instances.get_mut(id)) {
            let replace = match live.state {
                InstanceState::Accepted => false,
                InstanceState::Failed => true,
                InstanceState::Starting | InstanceState::WaitingLearn => {
                    instance.is_newer_than(live)
                }
            };
            if !replace {
                tracing::debug!(
                    instance_id = %instance_id,
                    elect = %ctx.message_id,
                    live = %live.message_id,
                    "stale elect stored as failed"
                );
                instance.state = InstanceState::Failed;
                self.instances.insert(ctx.message_id, instance);
                return ElectOutcome::Stale;
            }
            if live.fail() {
                tracing::info!(
                    instance_id = %instance_id,
                    superseded = %live.message_id,
                    by = %ctx.message_id,
                    "elect superseded"
                );
                superseded = Some(live.message_id.clone());
            }
        }

        let decided = instance.check_quorum();
        let learn = (decided && instance.proposer == self.local)
            .then(|| Self::build_learn(&instance, now));
        self.live.insert(instance_id, ctx.message_id.clone());
        self.instances.insert(ctx.message_id, instance);
        ElectOutcome::Started { superseded, learn }
    }

    /// Mark the local node's answer and build the `elect_accept` to publish.
    pub fn local_answer(
        &mut self,
        elect_id: &MessageId,
        accept: bool,
    ) -> Result<ConsensusElectAccept, ConsensusError> {
        let local = self.local;
        let instance = self.instance_mut(elect_id)?;
        if !instance.nodes.contains(&local) {
            return Err(ConsensusError::NotANode(local));
        }
        if instance.is_terminal() {
            return Err(ConsensusError::AlreadyDecided(elect_id.clone()));
        }
        instance.mark_answered();
        Ok(ConsensusElectAccept {
            instance_id: instance.instance_id.clone(),
            message_id: elect_id.clone(),
            accept,
        })
    }

    pub fn handle_elect_accept(
        &mut self,
        sender: PublicKey,
        answer_id: MessageId,
        answer: &ConsensusElectAccept,
        now: Timestamp,
    ) -> Result<AcceptOutcome, ConsensusError> {
        let local = self.local;
        let instance = self.checked_instance(&answer.message_id, &answer.instance_id)?;
        if sender == local {
            instance.mark_answered();
        }
        let outcome = match instance.record_answer(sender, answer_id, answer.accept) {
            AcceptResult::Ignored => AcceptOutcome::Ignored,
            AcceptResult::Counted => AcceptOutcome::Counted,
            AcceptResult::Refused => AcceptOutcome::Refused,
            AcceptResult::QuorumReached => {
                tracing::info!(
                    instance_id = %instance.instance_id,
                    elect = %instance.message_id,
                    acceptors = instance.acceptors.len(),
                    nodes = instance.nodes.len(),
                    "consensus quorum reached"
                );
                let learn = (instance.proposer == local).then(|| Self::build_learn(instance, now));
                AcceptOutcome::Accepted { learn }
            }
        };
        Ok(outcome)
    }

    /// Record a decision. Returns `false` if the instance was already decided.
    ///
    /// The acceptor list is not checked against the recorded answers.
    pub fn handle_learn(&mut self, learn: &ConsensusLearn) -> Result<bool, ConsensusError> {
        let instance = self.checked_instance(&learn.message_id, &learn.instance_id)?;
        let applied = instance.learn(learn.value.decision);
        if applied {
            tracing::info!(
                instance_id = %instance.instance_id,
                elect = %instance.message_id,
                decision = learn.value.decision,
                "consensus learned"
            );
        }
        Ok(applied)
    }

    pub fn handle_failure(&mut self, failure: &ConsensusFailure) -> Result<bool, ConsensusError> {
        let instance = self.checked_instance(&failure.message_id, &failure.instance_id)?;
        Ok(instance.fail())
    }

    /// Check the reference carried by `prepare`, `promise`, `propose` and
    /// `accept`.
    pub fn check_reference(&self, elect_id: &MessageId, instance_id: &Hash) -> Result<(), ConsensusError> {
        let instance = self
            .instances
            .get(elect_id)
            .ok_or_else(|| ConsensusError::UnknownElect(elect_id.clone()))?;
        Self::check_instance_id(instance, instance_id)
    }

    pub fn instance(&self, elect_id: &MessageId) -> Option<&ElectInstance> {
        self.instances.get(elect_id)
    }

    pub fn live_instance(&self, instance_id: &Hash) -> Option<&ElectInstance> {
        self.live.get(instance_id).and_then(|id| self.instances.get(id))
    }

    /// Every elect seen for an instance id, oldest first.
    pub fn instances_for(&self, instance_id: &Hash) -> Vec<&ElectInstance> {
        let mut all: Vec<&ElectInstance> = self
            .instances
            .values()
            .filter(|i| i.instance_id == *instance_id)
            .collect();
        all.sort_by(|a, b| (a.created_at, &a.message_id).cmp(&(b.created_at, &b.message_id)));
        all
    }

    /// Drop every instance whose channel belongs to `lao`.
    pub fn teardown(&mut self, lao: &Hash) -> usize {
        let before = self.instances.len();
        self.instances
            .retain(|_, i| i.channel.lao_id().as_ref() != Some(lao));
        let instances = &self.instances;
        self.live.retain(|_, id| instances.contains_key(id));
        before - self.instances.len()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn build_learn(instance: &ElectInstance, now: Timestamp) -> ConsensusLearn {
        ConsensusLearn {
            instance_id: instance.instance_id.clone(),
            message_id: instance.message_id.clone(),
            created_at: now,
            value: LearnValue { decision: true },
            acceptor_signatures: instance.acceptor_message_ids(),
        }
    }

    fn instance_mut(&mut self, elect_id: &MessageId) -> Result<&mut ElectInstance, ConsensusError> {
        self.instances
            .get_mut(elect_id)
            .ok_or_else(|| ConsensusError::UnknownElect(elect_id.clone()))
    }

    fn checked_instance(
        &mut self,
        elect_id: &MessageId,
        instance_id: &Hash,
    ) -> Result<&mut ElectInstance, ConsensusError> {
        let instance = self.instance_mut(elect_id)?;
        Self::check_instance_id(instance, instance_id)?;
        Ok(instance)
    }

    fn check_instance_id(instance: &ElectInstance, instance_id: &Hash) -> Result<(), ConsensusError> {
        if instance.instance_id != *instance_id {
            return Err(ConsensusError::InstanceMismatch {
                elect: instance.message_id.clone(),
                expected: instance.instance_id.clone(),
                actual: instance_id.clone(),
            });
        }
        Ok(())
    }
}
