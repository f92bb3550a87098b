use lao_messages::data::{CreateMeeting, StateMeeting};
use lao_types::{Hash, MessageId, Timestamp};

/// A scheduled meeting of a LAO.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Meeting {
    pub id: Hash,
    pub name: String,
    pub creation: Timestamp,
    pub location: Option<String>,
    pub start: Timestamp,
    pub end: Option<Timestamp>,
    pub last_modified: Timestamp,
    /// The message that produced the current properties.
    pub modification_id: MessageId,
    pub witnessed: bool,
}

impl Meeting {
    pub fn from_create(create: &CreateMeeting, message_id: MessageId) -> Self {
        Self {
            id: create.id.clone(),
            name: create.name.clone(),
            creation: create.creation,
            location: create.location.clone(),
            start: create.start,
            end: create.end,
            last_modified: create.creation,
            modification_id: message_id,
            witnessed: false,
        }
    }

    /// Replace with a certified state unless it is older.
    pub fn apply_state(&mut self, state: &StateMeeting) -> bool {
        if state.last_modified < self.last_modified {
            return false;
        }
        self.name = state.name.clone();
        self.location = state.location.clone();
        self.start = state.start;
        self.end = state.end;
        self.last_modified = state.last_modified;
        self.modification_id = state.modification_id.clone();
        self.witnessed = true;
        true
    }
}
