use lao_types::{Hash, MessageId, PublicKey};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// The referenced elect has not been seen (yet).
    #[error("unknown elect message {0}")]
    UnknownElect(MessageId),

    #[error("message refers to instance {actual} but elect {elect} belongs to {expected}")]
    InstanceMismatch {
        elect: MessageId,
        expected: Hash,
        actual: Hash,
    },

    #[error("{0} is not a consensus node of this instance")]
    NotANode(PublicKey),

    #[error("instance of elect {0} is already decided")]
    AlreadyDecided(MessageId),
}

impl ConsensusError {
    /// Whether the error means "try again once the referenced elect arrives".
    pub fn missing_elect(&self) -> Option<&MessageId> {
        match self {
            ConsensusError::UnknownElect(id) => Some(id),
            _ => None,
        }
    }
}
