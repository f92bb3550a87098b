use lao_types::{MessageId, PublicKey};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WitnessError {
    /// The signed message is not registered (yet).
    #[error("no witness entry for message {0}")]
    UnknownMessage(MessageId),

    #[error("{0} is not a witness of this LAO")]
    NotAWitness(PublicKey),

    #[error("invalid witness policy entry {0:?}")]
    InvalidPolicy(String),
}

impl WitnessError {
    pub fn missing_message(&self) -> Option<&MessageId> {
        match self {
            WitnessError::UnknownMessage(id) => Some(id),
            _ => None,
        }
    }
}
