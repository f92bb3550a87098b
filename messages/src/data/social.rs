//! `chirp#*` and `reaction#*` payloads.

use lao_types::{Channel, MessageId, Timestamp};
use serde::{Deserialize, Serialize};

use super::{ensure, non_empty, non_negative, Validate};
use crate::MessageError;

pub const MAX_CHIRP_CHARS: usize = 300;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddChirp {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    pub timestamp: Timestamp,
}

impl Validate for AddChirp {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("timestamp", self.timestamp)?;
        non_empty("text", &self.text)?;
        ensure(self.text.chars().count() <= MAX_CHIRP_CHARS, || {
            format!("chirp longer than {MAX_CHIRP_CHARS} characters")
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteChirp {
    pub chirp_id: MessageId,
    pub timestamp: Timestamp,
}

/// Payload of `chirp#notify_add` and `chirp#notify_delete`, relayed by the
/// server on the LAO's social feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyChirp {
    pub chirp_id: MessageId,
    pub channel: Channel,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddReaction {
    pub reaction_codepoint: String,
    pub chirp_id: MessageId,
    pub timestamp: Timestamp,
}

impl Validate for AddReaction {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("timestamp", self.timestamp)?;
        non_empty("reaction_codepoint", &self.reaction_codepoint)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteReaction {
    pub reaction_id: MessageId,
    pub timestamp: Timestamp,
}

impl Validate for DeleteChirp {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("timestamp", self.timestamp)
    }
}

impl Validate for NotifyChirp {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("timestamp", self.timestamp)
    }
}

impl Validate for DeleteReaction {
    fn validate(&self) -> Result<(), MessageError> {
        non_negative("timestamp", self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chirp_length_limit_counts_chars() {
        let ok = AddChirp {
            text: "é".repeat(MAX_CHIRP_CHARS),
            parent_id: None,
            timestamp: Timestamp::new(1),
        };
        assert!(ok.validate().is_ok());
        let long = AddChirp {
            text: "a".repeat(MAX_CHIRP_CHARS + 1),
            ..ok
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn empty_reaction_is_rejected() {
        let reaction = AddReaction {
            reaction_codepoint: " ".into(),
            chirp_id: MessageId::from_bytes([1u8; 32]),
            timestamp: Timestamp::new(1),
        };
        assert!(reaction.validate().is_err());
    }
}
