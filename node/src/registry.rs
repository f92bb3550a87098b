//! `(object, action)` → handler table.

use async_trait::async_trait;
use lao_messages::{Action, Data, Object, ObjectAction};
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::{ClientState, HandlerContext, HandlerOutput};
use crate::error::DataHandlingError;
use crate::handlers::{
    ConsensusHandler, ElectionHandler, LaoHandler, MeetingHandler, RollCallHandler, SocialHandler,
    WitnessHandler,
};

/// Applies one kind of payload to the client state.
///
/// A handler performs one transition against the repository or engine that
/// owns the fact, and reports what should be published or released.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        state: &ClientState,
        ctx: &HandlerContext,
        data: Data,
    ) -> Result<HandlerOutput, DataHandlingError>;
}

/// Error for a payload routed to a handler that does not know it.
pub(crate) fn unsupported(pair: ObjectAction) -> DataHandlingError {
    DataHandlingError::UnsupportedMessage {
        object: pair.object.to_string(),
        action: pair.action.to_string(),
    }
}

/// Handlers by `(object, action)`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ObjectAction, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// An empty registry. See [`HandlerRegistry::standard`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payload the client acts on.
    pub fn standard() -> Self {
        use Action::*;

        let mut registry = Self::new();
        registry.register_all(Object::Lao, &[Create, UpdateProperties, State, Greet], LaoHandler);
        registry.register_all(Object::Meeting, &[Create, State], MeetingHandler);
        registry.register_all(Object::RollCall, &[Create, Open, Reopen, Close], RollCallHandler);
        registry.register_all(
            Object::Election,
            &[Setup, Key, Open, CastVote, End, Result],
            ElectionHandler,
        );
        registry.register_all(
            Object::Consensus,
            &[Elect, ElectAccept, Prepare, Promise, Propose, Accept, Learn, Failure],
            ConsensusHandler,
        );
        registry.register_all(Object::Message, &[Witness], WitnessHandler);
        registry.register_all(Object::Chirp, &[Add, Delete, NotifyAdd, NotifyDelete], SocialHandler);
        registry.register_all(Object::Reaction, &[Add, Delete], SocialHandler);
        registry
    }

    /// Route `pair` to `handler`, replacing any previous route.
    pub fn register(&mut self, pair: ObjectAction, handler: Arc<dyn Handler>) {
        self.handlers.insert(pair, handler);
    }

    fn register_all<H: Handler + 'static>(&mut self, object: Object, actions: &[Action], handler: H) {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        for action in actions {
            self.register(ObjectAction::new(object, *action), Arc::clone(&handler));
        }
    }

    /// The handler for `pair`, or `UnsupportedMessage`.
    pub fn get(&self, pair: ObjectAction) -> Result<Arc<dyn Handler>, DataHandlingError> {
        self.handlers
            .get(&pair)
            .cloned()
            .ok_or_else(|| unsupported(pair))
    }

    pub fn contains(&self, pair: ObjectAction) -> bool {
        self.handlers.contains_key(&pair)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
