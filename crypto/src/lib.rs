//! Cryptographic primitives for the LAO protocol.
//!
//! - **SHA-256** over length-prefixed string parts for every derived id
//! - **Ed25519** for envelope and witness signatures
//! - **ElGamal** over the Ed25519 group for secret-ballot votes

pub mod elgamal;
pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use elgamal::{ElectionKeyPair, ElectionPublicKey, ElectionSecretKey, MAX_EMBED_LEN};
pub use error::CryptoError;
pub use hash::{hash, message_id};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
