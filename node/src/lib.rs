//! LAO client: applies protocol messages to local state.
//!
//! The client is the central coordinator that:
//! - Receives messages from every connected server
//! - Verifies envelopes and decodes payloads
//! - Routes each payload to the handler of its `(object, action)` pair
//! - Parks messages whose dependencies have not arrived yet
//! - Registers applied messages for witnessing and promotes them at quorum
//! - Publishes what the handlers produce, retrying until acknowledged
//! - Scopes background work to the LAO it belongs to

pub mod client;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod pending;
pub mod registry;
pub mod retry;
pub mod scope;

pub use client::LaoClient;
pub use config::{BackoffConfig, ClientConfig};
pub use context::{ClientState, HandlerContext, HandlerOutput, Publication, WitnessRequest};
pub use dispatcher::{Dispatcher, HandleOutcome};
pub use error::{DataHandlingError, NodeError};
pub use events::{EventBus, NodeEvent};
pub use logging::{init_logging, LogFormat};
pub use metrics::DispatchMetrics;
pub use pending::{PendingEntry, PendingQueue};
pub use registry::{Handler, HandlerRegistry};
pub use retry::{Publisher, RetryPolicy, RetryScheduler};
pub use scope::{wait_for_signal, LaoScope, LaoScopes, ScopeToken};
