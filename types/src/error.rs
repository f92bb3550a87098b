//! Error type for value-level parsing failures.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid base64url data: {0}")]
    InvalidBase64(String),

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid channel: {0}")]
    InvalidChannel(String),
}
