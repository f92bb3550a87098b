//! Fundamental types for the LAO protocol.
//!
//! This crate defines the value types shared across every other crate in the
//! workspace: base64url payloads, Ed25519 keys and signatures, content-addressed
//! identifiers, hierarchical channels and timestamps.

pub mod base64url;
pub mod channel;
pub mod error;
pub mod hash;
pub mod keys;
pub mod recent;
pub mod time;

pub use base64url::Base64UrlData;
pub use channel::Channel;
pub use error::TypesError;
pub use hash::{Hash, MessageId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use recent::RecentMap;
pub use time::{Clock, SystemClock, Timestamp};
