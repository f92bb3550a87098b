//! Content-addressed identifier derivations.
//!
//! Timestamps enter the hash as decimal seconds, keys and ids as their
//! base64url encodings.

use lao_crypto::hash;
use lao_types::{Hash, PublicKey, Timestamp};

pub fn lao_id(organizer: &PublicKey, creation: Timestamp, name: &str) -> Hash {
    hash(&[&organizer.encoded(), &creation.to_string(), name])
}

pub fn election_id(lao_id: &Hash, created_at: Timestamp, name: &str) -> Hash {
    hash(&["Election", lao_id.as_str(), &created_at.to_string(), name])
}

pub fn question_id(election_id: &Hash, question: &str) -> Hash {
    hash(&["Question", election_id.as_str(), question])
}

/// `selector` is the decimal option index, the ballot ciphertext or the
/// write-in text.
pub fn vote_id(election_id: &Hash, question_id: &Hash, selector: &str) -> Hash {
    hash(&["Vote", election_id.as_str(), question_id.as_str(), selector])
}

pub fn consensus_instance_id(object_type: &str, object_id: &Hash, property: &str) -> Hash {
    hash(&["consensus", object_type, object_id.as_str(), property])
}

/// Roll call ids: `creation/name` on create, `opens/opened_at` on open and
/// reopen, `closes/closed_at` on close.
pub fn roll_call_id(lao_id: &Hash, reference: &str, detail: &str) -> Hash {
    hash(&["R", lao_id.as_str(), reference, detail])
}

pub fn meeting_id(lao_id: &Hash, creation: Timestamp, name: &str) -> Hash {
    hash(&["M", lao_id.as_str(), &creation.to_string(), name])
}
