//! Consensus among LAO witnesses.
//!
//! An organizer or witness proposes a value for one property of one object
//! with `consensus#elect`. Every participating node answers with
//! `elect_accept`; once a strict majority accepted, the proposer publishes
//! `learn` and everybody records the decision. Servers run the Paxos phases
//! in between; this crate only checks that those refer to a known elect.

pub mod engine;
pub mod error;
pub mod instance;

pub use engine::{AcceptOutcome, ConsensusEngine, ElectContext, ElectOutcome};
pub use error::ConsensusError;
pub use instance::{quorum, AcceptResult, ElectInstance, InstanceState};
