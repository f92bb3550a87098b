//! Witnessing of LAO facts.
//!
//! Every fact a LAO member publishes (except the exempt kinds) waits for the
//! signatures of all LAO witnesses. Once the last one arrives the fact is
//! promoted to "witnessed" and the entry retired.

pub mod engine;
pub mod error;
pub mod message;
pub mod policy;

pub use engine::{witness_quorum, Promotion, RegisterOutcome, WitnessEngine};
pub use error::WitnessError;
pub use message::{WitnessMessage, WitnessSubject};
pub use policy::WitnessPolicy;
