use lao_crypto::CryptoError;
use lao_store::StoreError;
use lao_types::{Hash, Timestamp};
use thiserror::Error;

use crate::ElectionState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElectionError {
    #[error("unknown election {0}")]
    UnknownElection(Hash),

    #[error("election {0} already exists")]
    AlreadyExists(Hash),

    #[error("election {election} has no question {question}")]
    UnknownQuestion { election: Hash, question: Hash },

    #[error("election is {state:?}, expected {expected:?}")]
    WrongState {
        state: ElectionState,
        expected: ElectionState,
    },

    #[error("vote cast at {created_at} outside the election window [{start}, {end}]")]
    OutsideWindow {
        created_at: Timestamp,
        start: Timestamp,
        end: Timestamp,
    },

    /// Asked for the plaintext of a secret-ballot vote.
    #[error("vote {0} is encrypted")]
    EncryptedBallot(Hash),

    #[error("vote {0} is not encrypted but the election uses secret ballots")]
    PlaintextBallot(Hash),

    #[error("vote {0} carries no ballot index")]
    NoSelection(Hash),

    #[error("question {question} has {options} options, vote picks {index}")]
    OptionOutOfRange {
        question: Hash,
        index: u16,
        options: usize,
    },

    #[error("question {0} does not allow write-ins")]
    WriteInNotAllowed(Hash),

    #[error("election {0} has no key yet")]
    MissingKey(Hash),

    #[error("election {0} already has a key")]
    KeyAlreadySet(Hash),

    #[error("ballot decryption failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ElectionError {
    /// The election the message depends on, when it is simply not known yet.
    pub fn missing_election(&self) -> Option<&Hash> {
        match self {
            ElectionError::UnknownElection(id) => Some(id),
            _ => None,
        }
    }
}
