//! Connections to LAO servers.
//!
//! A [`ConnectionManager`] keeps one [`Connection`] per configured server.
//! Requests fan out to every server and complete once all of them answered.
//! Messages pushed by servers are deduplicated by message id and delivered on
//! a single stream. Dropped connections come back with bounded exponential
//! backoff and replay the persisted subscriptions.

pub mod connection;
pub mod dedup;
pub mod error;
pub mod events;
pub mod manager;
pub mod tasks;
pub mod transport;
pub mod ws;

pub use connection::{Connection, ReconnectPolicy};
pub use dedup::{MessageDedup, DEFAULT_DEDUP_CAPACITY};
pub use error::NetworkError;
pub use events::{ConnectionEvent, InboundMessage};
pub use manager::{ConnectionManager, NetworkConfig};
pub use tasks::join_tasks;
pub use transport::{Link, Transport};
pub use ws::WsTransport;
