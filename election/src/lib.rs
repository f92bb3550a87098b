//! Elections inside a LAO.
//!
//! An election is set up by the organizer, optionally given a public key for
//! secret ballots, opened, voted on and ended. Each sender's latest vote per
//! question counts. At the end every client derives the same tally because
//! counted votes are put in one canonical order before hashing and counting.

pub mod ballot;
pub mod engine;
pub mod error;
pub mod model;
pub mod tally;

pub use ballot::{check_vote, decrypt_index, plaintext_index};
pub use engine::{CastOutcome, ElectionEngine, EndOutcome};
pub use error::ElectionError;
pub use model::{Election, ElectionState, RecordedVote};
pub use tally::{canonical_order, count_votes, registered_votes_digest, Selection, Tally};
