//! The byte pipe under a connection.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::NetworkError;

/// An open session with one server. Text frames go out on `outbound` and
/// come in on `inbound`; `inbound` ends when the session drops.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens sessions to servers. WebSockets in production, in-memory
/// sessions in tests.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, peer: &str) -> Result<Link, NetworkError>;
}
