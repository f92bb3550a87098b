//! `message#witness`: a witness countersigning another message.

use lao_types::{MessageId, Signature};
use serde::{Deserialize, Serialize};

use super::Validate;
use crate::MessageError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WitnessMessageSignature {
    pub message_id: MessageId,
    /// Signature over the decoded bytes of `message_id`.
    pub signature: Signature,
}

impl Validate for WitnessMessageSignature {
    fn validate(&self) -> Result<(), MessageError> {
        Ok(())
    }
}
