use lao_consensus::ConsensusError;
use lao_election::ElectionError;
use lao_messages::MessageError;
use lao_network::NetworkError;
use lao_store::StoreError;
use lao_types::{Hash, MessageId, PublicKey};
use lao_witness::WitnessError;
use thiserror::Error;

/// Failures of client operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("message error: {0}")]
    Message(#[from] MessageError),

    #[error("election error: {0}")]
    Election(#[from] ElectionError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("witness error: {0}")]
    Witness(#[from] WitnessError),

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("unknown LAO {0}")]
    UnknownLao(Hash),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why an inbound message could not be applied.
///
/// Dependency errors park the message until the missing fact arrives; every
/// other variant is terminal for that message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataHandlingError {
    #[error("message id mismatch: carried {carried}, computed {computed}")]
    InvalidMessageId { carried: MessageId, computed: MessageId },

    #[error("signature does not verify for sender {0}")]
    InvalidSignature(PublicKey),

    #[error("invalid data format: {0}")]
    InvalidDataFormat(String),

    #[error("unsupported message {object}#{action}")]
    UnsupportedMessage { object: String, action: String },

    #[error("{sender} may not {action}")]
    Unauthorized { sender: PublicKey, action: String },

    #[error("{0} arrived on the wrong channel")]
    WrongChannel(String),

    #[error("unknown LAO {0}")]
    UnknownLao(Hash),

    #[error("unknown roll call {0}")]
    UnknownRollCall(Hash),

    #[error("unknown meeting {0}")]
    UnknownMeeting(Hash),

    #[error("unknown message {0}")]
    UnknownMessage(MessageId),

    #[error("conflicting state: {0}")]
    Conflict(String),

    #[error(transparent)]
    Election(ElectionError),

    #[error(transparent)]
    Consensus(ConsensusError),

    #[error(transparent)]
    Witness(WitnessError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl DataHandlingError {
    /// The id whose arrival may let the message through.
    pub fn dependency(&self) -> Option<Hash> {
        match self {
            DataHandlingError::UnknownLao(id)
            | DataHandlingError::UnknownRollCall(id)
            | DataHandlingError::UnknownMeeting(id) => Some(id.clone()),
            DataHandlingError::UnknownMessage(id) => Some(id.clone().into()),
            DataHandlingError::Election(ElectionError::UnknownElection(id)) => Some(id.clone()),
            DataHandlingError::Consensus(e) => e.missing_elect().cloned().map(Hash::from),
            DataHandlingError::Witness(e) => e.missing_message().cloned().map(Hash::from),
            _ => None,
        }
    }

    /// Whether the message should be parked and retried.
    pub fn is_recoverable(&self) -> bool {
        self.dependency().is_some()
    }
}

impl From<MessageError> for DataHandlingError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::InvalidMessageId { carried, computed } => {
                DataHandlingError::InvalidMessageId { carried, computed }
            }
            MessageError::InvalidSignature(sender) => DataHandlingError::InvalidSignature(sender),
            MessageError::Unsupported { object, action } => {
                DataHandlingError::UnsupportedMessage { object, action }
            }
            other => DataHandlingError::InvalidDataFormat(other.to_string()),
        }
    }
}

impl From<ElectionError> for DataHandlingError {
    fn from(e: ElectionError) -> Self {
        DataHandlingError::Election(e)
    }
}

impl From<ConsensusError> for DataHandlingError {
    fn from(e: ConsensusError) -> Self {
        DataHandlingError::Consensus(e)
    }
}

impl From<WitnessError> for DataHandlingError {
    fn from(e: WitnessError) -> Self {
        DataHandlingError::Witness(e)
    }
}

impl From<StoreError> for DataHandlingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Rejected(reason) => DataHandlingError::Conflict(reason),
            other => DataHandlingError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_are_recoverable() {
        let lao = Hash::from_bytes([1u8; 32]);
        let elect = MessageId::from_bytes([2u8; 32]);
        assert_eq!(DataHandlingError::UnknownLao(lao.clone()).dependency(), Some(lao.clone()));
        assert_eq!(
            DataHandlingError::Consensus(ConsensusError::UnknownElect(elect.clone())).dependency(),
            Some(Hash::from(elect.clone()))
        );
        assert!(DataHandlingError::Election(ElectionError::UnknownElection(lao)).is_recoverable());
        assert!(DataHandlingError::Witness(WitnessError::UnknownMessage(elect)).is_recoverable());
    }

    #[test]
    fn protocol_errors_are_terminal() {
        let err = DataHandlingError::from(MessageError::Unsupported {
            object: "coin".into(),
            action: "post_transaction".into(),
        });
        assert!(matches!(err, DataHandlingError::UnsupportedMessage { .. }));
        assert!(!err.is_recoverable());
        assert!(!DataHandlingError::InvalidSignature(PublicKey([0u8; 32])).is_recoverable());
        assert!(!DataHandlingError::from(StoreError::Rejected("closed".into())).is_recoverable());
    }
}
