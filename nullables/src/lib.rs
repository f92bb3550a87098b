//! Nullable infrastructure for deterministic testing.
//!
//! The clock and the server transport are abstracted behind traits. This
//! crate provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod transport;

pub use clock::NullClock;
pub use transport::{NullServer, NullTransport};
