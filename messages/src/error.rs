use lao_types::{MessageId, PublicKey, TypesError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("unsupported message {object}#{action}")]
    Unsupported { object: String, action: String },

    #[error("invalid data format: {0}")]
    InvalidData(String),

    #[error("message id mismatch: carried {carried}, computed {computed}")]
    InvalidMessageId {
        carried: MessageId,
        computed: MessageId,
    },

    #[error("signature does not verify for sender {0}")]
    InvalidSignature(PublicKey),

    #[error(transparent)]
    Types(#[from] TypesError),
}

impl From<serde_json::Error> for MessageError {
    fn from(e: serde_json::Error) -> Self {
        MessageError::Json(e.to_string())
    }
}
