//! Events emitted while applying messages.

use lao_messages::ObjectAction;
use lao_store::RollCallState;
use lao_types::{Channel, Hash, MessageId};
use lao_witness::WitnessSubject;
use std::sync::RwLock;
use tokio::sync::broadcast;

const STREAM_CAPACITY: usize = 1024;

/// Client-level events that observers can subscribe to via the [`EventBus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    /// A message was applied to local state.
    MessageApplied {
        channel: Channel,
        message_id: MessageId,
        pair: ObjectAction,
    },
    /// A message was dropped for good.
    MessageRejected {
        channel: Channel,
        message_id: MessageId,
        reason: String,
    },
    /// A message waits for `dependency`.
    MessageParked {
        channel: Channel,
        message_id: MessageId,
        dependency: Hash,
    },
    LaoCreated {
        lao: Hash,
    },
    LaoUpdated {
        lao: Hash,
    },
    LaoGreeted {
        lao: Hash,
        address: String,
        peers: Vec<String>,
    },
    MeetingChanged {
        lao: Hash,
        meeting: Hash,
    },
    RollCallChanged {
        lao: Hash,
        roll_call: Hash,
        state: RollCallState,
    },
    ElectionChanged {
        lao: Hash,
        election: Hash,
    },
    /// Tally done. `matches` is false when the organizer announced a
    /// different registered-votes digest.
    ElectionEnded {
        lao: Hash,
        election: Hash,
        matches: bool,
        invalid_ballots: usize,
    },
    ConsensusStarted {
        instance_id: Hash,
        elect: MessageId,
    },
    ConsensusDecided {
        instance_id: Hash,
        elect: MessageId,
        accepted: bool,
    },
    /// Every witness signed.
    Witnessed {
        lao: Hash,
        message_id: MessageId,
        subject: WitnessSubject,
    },
    ChirpAdded {
        lao: Hash,
        chirp: MessageId,
    },
    ChirpDeleted {
        lao: Hash,
        chirp: MessageId,
    },
    /// A publication ran out of attempts.
    PublicationFailed {
        channel: Channel,
        message_id: MessageId,
        reason: String,
    },
    LaoTornDown {
        lao: Hash,
    },
}

type Listener = Box<dyn Fn(&NodeEvent) + Send + Sync>;

/// Fan-out event bus.
///
/// Listeners are invoked inline on the emitting task; keep them fast to
/// avoid stalling dispatch. Async consumers use [`EventBus::stream`]
/// instead, where a lagging receiver loses the oldest events.
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
    stream: broadcast::Sender<NodeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (stream, _) = broadcast::channel(STREAM_CAPACITY);
        Self {
            listeners: RwLock::new(Vec::new()),
            stream,
        }
    }

    /// Add an inline listener.
    pub fn subscribe(&self, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    /// A receiver for events emitted from now on.
    pub fn stream(&self) -> broadcast::Receiver<NodeEvent> {
        self.stream.subscribe()
    }

    pub fn emit(&self, event: NodeEvent) {
        for listener in self.listeners.read().unwrap_or_else(|e| e.into_inner()).iter() {
            listener(&event);
        }
        // No stream receivers is fine.
        let _ = self.stream.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
