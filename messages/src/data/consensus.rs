//! `consensus#*` payloads.
//!
//! Only `elect`, `elect_accept`, `learn` and `failure` drive client state;
//! the Paxos phases in between are decoded so their references can be
//! checked.

use lao_types::{Hash, MessageId, Timestamp};
use serde::{Deserialize, Serialize};

use super::{ensure, non_negative, Validate};
use crate::{ids, MessageError};

/// What is being agreed on: one property of one object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusKey {
    #[serde(rename = "type")]
    pub object_type: String,
    pub id: Hash,
    pub property: String,
}

impl ConsensusKey {
    pub fn instance_id(&self) -> Hash {
        ids::consensus_instance_id(&self.object_type, &self.id, &self.property)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusElect {
    pub instance_id: Hash,
    pub created_at: Timestamp,
    pub key: ConsensusKey,
    pub value: String,
}

impl ConsensusElect {
    pub fn new(key: ConsensusKey, value: &str, created_at: Timestamp) -> Self {
        Self {
            instance_id: key.instance_id(),
            created_at,
            key,
            value: value.to_string(),
        }
    }
}

impl Validate for ConsensusElect {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("created_at", self.created_at)?;
        ensure(self.instance_id == self.key.instance_id(), || {
            format!("instance id {} does not match its key", self.instance_id)
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusElectAccept {
    pub instance_id: Hash,
    /// The elect being answered.
    pub message_id: MessageId,
    pub accept: bool,
}

impl Validate for ConsensusElectAccept {
    fn validate(&self) -> Result<(), MessageError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrepareValue {
    pub proposed_try: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusPrepare {
    pub instance_id: Hash,
    pub message_id: MessageId,
    pub created_at: Timestamp,
    pub value: PrepareValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromiseValue {
    pub accepted_try: i64,
    pub accepted_value: bool,
    pub promised_try: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusPromise {
    pub instance_id: Hash,
    pub message_id: MessageId,
    pub created_at: Timestamp,
    pub value: PromiseValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposeValue {
    pub proposed_try: i64,
    pub proposed_value: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusPropose {
    pub instance_id: Hash,
    pub message_id: MessageId,
    pub created_at: Timestamp,
    pub value: ProposeValue,
    #[serde(rename = "acceptor-signatures")]
    pub acceptor_signatures: Vec<MessageId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcceptValue {
    pub accepted_try: i64,
    pub accepted_value: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusAccept {
    pub instance_id: Hash,
    pub message_id: MessageId,
    pub created_at: Timestamp,
    pub value: AcceptValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LearnValue {
    pub decision: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusLearn {
    pub instance_id: Hash,
    pub message_id: MessageId,
    pub created_at: Timestamp,
    pub value: LearnValue,
    /// Message ids of the accepting `elect_accept`s.
    #[serde(rename = "acceptor-signatures")]
    pub acceptor_signatures: Vec<MessageId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsensusFailure {
    pub instance_id: Hash,
    pub message_id: MessageId,
    pub created_at: Timestamp,
}

macro_rules! timestamped {
    ($($ty:ty),*) => {
        $(
            impl Validate for $ty {
                fn validate(&self) -> Result<(), MessageError> {
                    non_negative("created_at", self.created_at)
                }
            }
        )*
    };
}

timestamped!(
    ConsensusPrepare,
    ConsensusPromise,
    ConsensusPropose,
    ConsensusAccept,
    ConsensusLearn,
    ConsensusFailure
);
