//! `roll_call#*` payloads.
//!
//! A roll call keeps a persistent id (the one of its creation) while each
//! open, reopen and close derives a fresh `update_id` that the next
//! transition refers to.

use lao_types::{Hash, PublicKey, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{ensure, non_empty, non_negative, not_before, Validate};
use crate::{ids, MessageError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRollCall {
    pub id: Hash,
    pub name: String,
    pub creation: Timestamp,
    pub proposed_start: Timestamp,
    pub proposed_end: Timestamp,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CreateRollCall {
    pub fn new(
        lao_id: &Hash,
        name: &str,
        creation: Timestamp,
        proposed_start: Timestamp,
        proposed_end: Timestamp,
        location: &str,
        description: Option<String>,
    ) -> Self {
        Self {
            id: Self::expected_id(lao_id, creation, name),
            name: name.to_string(),
            creation,
            proposed_start,
            proposed_end,
            location: location.to_string(),
            description,
        }
    }

    pub fn expected_id(lao_id: &Hash, creation: Timestamp, name: &str) -> Hash {
        ids::roll_call_id(lao_id, &creation.to_string(), name)
    }
}

impl Validate for CreateRollCall {
    fn validate(&self) -> Result<(), MessageError> {
        non_empty("name", &self.name)?;
        non_negative("creation", self.creation)?;
        not_before("proposed_start", self.proposed_start, "creation", self.creation)?;
        not_before("proposed_end", self.proposed_end, "proposed_start", self.proposed_start)
    }
}

/// Payload of both `roll_call#open` and `roll_call#reopen`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenRollCall {
    pub update_id: Hash,
    pub opens: Hash,
    pub opened_at: Timestamp,
}

impl OpenRollCall {
    pub fn new(lao_id: &Hash, opens: Hash, opened_at: Timestamp) -> Self {
        Self {
            update_id: Self::expected_id(lao_id, &opens, opened_at),
            opens,
            opened_at,
        }
    }

    pub fn expected_id(lao_id: &Hash, opens: &Hash, opened_at: Timestamp) -> Hash {
        ids::roll_call_id(lao_id, opens.as_str(), &opened_at.to_string())
    }
}

impl Validate for OpenRollCall {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("opened_at", self.opened_at)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseRollCall {
    pub update_id: Hash,
    pub closes: Hash,
    pub closed_at: Timestamp,
    pub attendees: Vec<PublicKey>,
}

impl CloseRollCall {
    pub fn new(lao_id: &Hash, closes: Hash, closed_at: Timestamp, attendees: Vec<PublicKey>) -> Self {
        Self {
            update_id: Self::expected_id(lao_id, &closes, closed_at),
            closes,
            closed_at,
            attendees,
        }
    }

    pub fn expected_id(lao_id: &Hash, closes: &Hash, closed_at: Timestamp) -> Hash {
        ids::roll_call_id(lao_id, closes.as_str(), &closed_at.to_string())
    }
}

impl Validate for CloseRollCall {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("closed_at", self.closed_at)?;
        let mut seen = HashSet::new();
        ensure(self.attendees.iter().all(|a| seen.insert(*a)), || {
            "duplicate attendee".into()
        })
    }
}
