use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid curve point")]
    InvalidPoint,

    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("payload of {len} bytes exceeds the {max}-byte embedding limit")]
    PayloadTooLong { len: usize, max: usize },

    #[error("could not embed payload into a curve point")]
    EmbeddingFailed,

    #[error(transparent)]
    Encoding(#[from] lao_types::TypesError),
}
