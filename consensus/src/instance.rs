//! One consensus instance: the life of a single `elect` message.

use lao_messages::data::ConsensusKey;
use lao_types::{Channel, Hash, MessageId, PublicKey, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

/// Strict majority of `nodes` participants.
pub fn quorum(nodes: usize) -> usize {
    nodes / 2 + 1
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceState {
    /// Elect received, local node has not answered.
    Starting,
    /// Local node answered, waiting for the decision.
    WaitingLearn,
    /// A majority accepted, or a positive learn arrived. Terminal.
    Accepted,
    /// Superseded, refused by learn, or reported failed. Terminal.
    Failed,
}

/// Result of recording one `elect_accept`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AcceptResult {
    /// Counted toward quorum, which is not reached yet.
    Counted,
    /// A refusal, recorded but not counted.
    Refused,
    /// This acceptance reached quorum; the instance is now `Accepted`.
    QuorumReached,
    /// Not a node, repeated answer, or the instance is already decided.
    Ignored,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElectInstance {
    pub message_id: MessageId,
    pub channel: Channel,
    pub proposer: PublicKey,
    pub instance_id: Hash,
    pub key: ConsensusKey,
    pub value: String,
    pub created_at: Timestamp,
    pub nodes: BTreeSet<PublicKey>,
    /// Accepting node -> id of its `elect_accept`.
    pub acceptors: BTreeMap<PublicKey, MessageId>,
    pub refusals: BTreeMap<PublicKey, MessageId>,
    pub state: InstanceState,
    pub learned: Option<bool>,
}

impl ElectInstance {
    /// A proposer that is itself a node counts as the first acceptor, with
    /// the elect standing in for its answer.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        message_id: MessageId,
        channel: Channel,
        proposer: PublicKey,
        key: ConsensusKey,
        value: String,
        created_at: Timestamp,
        nodes: BTreeSet<PublicKey>,
    ) -> Self {
        let mut acceptors = BTreeMap::new();
        if nodes.contains(&proposer) {
            acceptors.insert(proposer, message_id.clone());
        }
        Self {
            instance_id: key.instance_id(),
            message_id,
            channel,
            proposer,
            key,
            value,
            created_at,
            nodes,
            acceptors,
            refusals: BTreeMap::new(),
            state: InstanceState::Starting,
            learned: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, InstanceState::Accepted | InstanceState::Failed)
    }

    pub fn quorum(&self) -> usize {
        quorum(self.nodes.len())
    }

    pub fn has_quorum(&self) -> bool {
        self.acceptors.len() >= self.quorum()
    }

    /// Ordering used to decide which of two elects for the same instance id
    /// is the newer one.
    pub fn is_newer_than(&self, other: &ElectInstance) -> bool {
        (self.created_at, &self.message_id) > (other.created_at, &other.message_id)
    }

    /// Accept with the elect alone if the proposer's own acceptance already
    /// forms a majority.
    pub fn check_quorum(&mut self) -> bool {
        if !self.is_terminal() && self.has_quorum() {
            self.state = InstanceState::Accepted;
            return true;
        }
        false
    }

    pub fn record_answer(&mut self, node: PublicKey, answer_id: MessageId, accept: bool) -> AcceptResult {
        if self.is_terminal()
            || !self.nodes.contains(&node)
            || self.acceptors.contains_key(&node)
            || self.refusals.contains_key(&node)
        {
            return AcceptResult::Ignored;
        }
        if !accept {
            self.refusals.insert(node, answer_id);
            return AcceptResult::Refused;
        }
        self.acceptors.insert(node, answer_id);
        if self.check_quorum() {
            AcceptResult::QuorumReached
        } else {
            AcceptResult::Counted
        }
    }

    /// The local node has answered.
    pub fn mark_answered(&mut self) {
        if self.state == InstanceState::Starting {
            self.state = InstanceState::WaitingLearn;
        }
    }

    /// Apply a learned decision. Terminal instances keep their state.
    pub fn learn(&mut self, decision: bool) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.learned = Some(decision);
        self.state = if decision {
            InstanceState::Accepted
        } else {
            InstanceState::Failed
        };
        true
    }

    pub fn fail(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = InstanceState::Failed;
        true
    }

    /// Ids of the accepting answers, in acceptor order.
    pub fn acceptor_message_ids(&self) -> Vec<MessageId> {
        self.acceptors.values().cloned().collect()
    }
}
