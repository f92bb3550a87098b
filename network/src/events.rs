use lao_messages::MessageGeneral;
use lao_types::Channel;

/// Lifecycle of one server connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { peer: String },
    Disconnected { peer: String, reason: String },
    Reconnected { peer: String },
    /// Reconnect attempts are exhausted.
    GaveUp { peer: String },
}

impl ConnectionEvent {
    /// The server the event is about.
    pub fn peer(&self) -> &str {
        match self {
            ConnectionEvent::Connected { peer }
            | ConnectionEvent::Disconnected { peer, .. }
            | ConnectionEvent::Reconnected { peer }
            | ConnectionEvent::GaveUp { peer } => peer,
        }
    }
}

/// A message pushed by a server, first time it is seen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// First server that pushed it.
    pub peer: String,
    pub channel: Channel,
    pub message: MessageGeneral,
}
