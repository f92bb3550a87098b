use lao_messages::MessageError;
use lao_store::StoreError;
use thiserror::Error;

/// Failures talking to servers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("connection to {peer} failed: {reason}")]
    ConnectionFailed { peer: String, reason: String },

    #[error("not connected to {0}")]
    NotConnected(String),

    #[error("connection to {0} dropped before the answer arrived")]
    Disconnected(String),

    #[error("{peer} did not answer {method} in time")]
    Timeout { peer: String, method: &'static str },

    #[error("{peer} rejected {method}: {code} {description}")]
    Rejected {
        peer: String,
        method: &'static str,
        code: i64,
        description: String,
    },

    #[error("{peer} answered {method} with an unexpected result")]
    UnexpectedAnswer { peer: String, method: &'static str },

    #[error("no servers configured")]
    NoPeers,

    #[error(transparent)]
    Frame(#[from] MessageError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
