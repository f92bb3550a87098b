//! `lao#*` payloads.

use lao_types::{Hash, MessageId, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{ensure, non_empty, non_negative, not_before, Validate};
use crate::{ids, MessageError, WitnessSignature};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateLao {
    pub id: Hash,
    pub name: String,
    pub creation: Timestamp,
    pub organizer: PublicKey,
    pub witnesses: Vec<PublicKey>,
}

impl CreateLao {
    pub fn new(name: &str, creation: Timestamp, organizer: PublicKey, witnesses: Vec<PublicKey>) -> Self {
        Self {
            id: ids::lao_id(&organizer, creation, name),
            name: name.to_string(),
            creation,
            organizer,
            witnesses,
        }
    }
}

impl Validate for CreateLao {
    fn validate(&self) -> Result<(), MessageError> {
        non_empty("name", &self.name)?;
        non_negative("creation", self.creation)?;
        unique_witnesses(&self.witnesses)?;
        let expected = ids::lao_id(&self.organizer, self.creation, &self.name);
        ensure(self.id == expected, || format!("lao id {} does not match its fields", self.id))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateLao {
    pub id: Hash,
    pub name: String,
    pub last_modified: Timestamp,
    pub witnesses: Vec<PublicKey>,
}

impl Validate for UpdateLao {
    fn validate(&self) -> Result<(), MessageError> {
        non_empty("name", &self.name)?;
        non_negative("last_modified", self.last_modified)?;
        unique_witnesses(&self.witnesses)
    }
}

/// Certified state of a LAO after an update, carrying the witnesses'
/// signatures over the update message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateLao {
    pub id: Hash,
    pub name: String,
    pub creation: Timestamp,
    pub last_modified: Timestamp,
    pub organizer: PublicKey,
    pub witnesses: Vec<PublicKey>,
    pub modification_id: MessageId,
    pub modification_signatures: Vec<WitnessSignature>,
}

impl Validate for StateLao {
    fn validate(&self) -> Result<(), MessageError> {
        non_empty("name", &self.name)?;
        non_negative("creation", self.creation)?;
        not_before("last_modified", self.last_modified, "creation", self.creation)?;
        unique_witnesses(&self.witnesses)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerAddress {
    pub address: String,
}

/// Sent by a server on the LAO channel to advertise itself and its peers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GreetLao {
    pub lao: Hash,
    pub frontend: PublicKey,
    pub address: String,
    pub peers: Vec<PeerAddress>,
}

impl Validate for GreetLao {
    fn validate(&self) -> Result<(), MessageError> {
        non_empty("address", &self.address)?;
        ensure(
            self.peers.iter().all(|p| !p.address.is_empty()),
            || "peer with empty address".into(),
        )
    }
}

fn unique_witnesses(witnesses: &[PublicKey]) -> Result<(), MessageError> {
    let mut seen = HashSet::new();
    ensure(witnesses.iter().all(|w| seen.insert(*w)), || {
        "duplicate witness".into()
    })
}
