//! Typed message payloads.
//!
//! A payload is a JSON object carrying `object` and `action` discriminants
//! plus a fixed set of fields for that pair. Decoding looks the pair up in a
//! closed table; anything not in the table is [`MessageError::Unsupported`],
//! and unknown fields are rejected.

pub mod consensus;
pub mod election;
pub mod lao;
pub mod meeting;
pub mod roll_call;
pub mod social;
pub mod witness;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::MessageError;
use lao_types::Timestamp;

pub use consensus::{
    ConsensusAccept, ConsensusElect, ConsensusElectAccept, ConsensusFailure, ConsensusKey,
    ConsensusLearn, ConsensusPrepare, ConsensusPromise, ConsensusPropose,
};
pub use election::{
    CastVote, ElectionKey, ElectionQuestion, ElectionResult, ElectionSetup, ElectionVersion,
    EndElection, OpenElection, QuestionResult, QuestionResultEntry, Vote, VoteValue,
    VotingMethod,
};
pub use lao::{CreateLao, GreetLao, PeerAddress, StateLao, UpdateLao};
pub use meeting::{CreateMeeting, StateMeeting};
pub use roll_call::{CloseRollCall, CreateRollCall, OpenRollCall};
pub use social::{AddChirp, AddReaction, DeleteChirp, DeleteReaction, NotifyChirp};
pub use witness::WitnessMessageSignature;

/// Structural checks a payload performs on itself after decoding.
///
/// Checks that need state (the LAO id of the channel, the previous roll call
/// id) are left to the handler.
pub trait Validate {
    fn validate(&self) -> Result<(), MessageError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Object {
    Lao,
    Meeting,
    RollCall,
    Election,
    Consensus,
    Message,
    Chirp,
    Reaction,
    Coin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    UpdateProperties,
    State,
    Greet,
    Open,
    Reopen,
    Close,
    Setup,
    Key,
    CastVote,
    End,
    Result,
    Elect,
    ElectAccept,
    Prepare,
    Promise,
    Propose,
    Accept,
    Learn,
    Failure,
    Witness,
    Add,
    Delete,
    NotifyAdd,
    NotifyDelete,
    PostTransaction,
}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $name:literal),* $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $ty::$variant => $name, )*
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $name => Some($ty::$variant), )*
                    _ => None,
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(Object {
    Lao => "lao",
    Meeting => "meeting",
    RollCall => "roll_call",
    Election => "election",
    Consensus => "consensus",
    Message => "message",
    Chirp => "chirp",
    Reaction => "reaction",
    Coin => "coin",
});

string_enum!(Action {
    Create => "create",
    UpdateProperties => "update_properties",
    State => "state",
    Greet => "greet",
    Open => "open",
    Reopen => "reopen",
    Close => "close",
    Setup => "setup",
    Key => "key",
    CastVote => "cast_vote",
    End => "end",
    Result => "result",
    Elect => "elect",
    ElectAccept => "elect_accept",
    Prepare => "prepare",
    Promise => "promise",
    Propose => "propose",
    Accept => "accept",
    Learn => "learn",
    Failure => "failure",
    Witness => "witness",
    Add => "add",
    Delete => "delete",
    NotifyAdd => "notify_add",
    NotifyDelete => "notify_delete",
    PostTransaction => "post_transaction",
});

/// The `(object, action)` discriminant of a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectAction {
    pub object: Object,
    pub action: Action,
}

impl ObjectAction {
    pub const fn new(object: Object, action: Action) -> Self {
        Self { object, action }
    }
}

impl fmt::Display for ObjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.object, self.action)
    }
}

macro_rules! data_table {
    ($( $variant:ident($ty:ty) => $object:ident / $action:ident $(($shared:ident))? ),* $(,)?) => {
        /// Every payload this client understands.
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub enum Data {
            $( $variant($ty), )*
        }

        impl Data {
            pub fn object_action(&self) -> ObjectAction {
                match self {
                    $( Data::$variant(_) => ObjectAction::new(Object::$object, Action::$action), )*
                }
            }

            pub fn validate(&self) -> Result<(), MessageError> {
                match self {
                    $( Data::$variant(d) => d.validate(), )*
                }
            }

            /// Whether the pair has a decoder in this table.
            pub fn is_supported(pair: ObjectAction) -> bool {
                $( if pair == ObjectAction::new(Object::$object, Action::$action) {
                    return true;
                } )*
                false
            }

            fn fields(&self) -> Result<Value, MessageError> {
                let value = match self {
                    $( Data::$variant(d) => serde_json::to_value(d)?, )*
                };
                Ok(value)
            }

            fn from_fields(pair: ObjectAction, fields: Value) -> Result<Self, MessageError> {
                $( if pair == ObjectAction::new(Object::$object, Action::$action) {
                    let data: $ty = serde_json::from_value(fields)
                        .map_err(|e| MessageError::InvalidData(format!("{pair}: {e}")))?;
                    data.validate()?;
                    return Ok(Data::$variant(data));
                } )*
                Err(MessageError::Unsupported {
                    object: pair.object.to_string(),
                    action: pair.action.to_string(),
                })
            }
        }

        $( data_from!($variant, $ty $(, $shared)?); )*
    };
}

/// `From` for payload types owned by a single variant. Types shared by two
/// actions have no default variant.
macro_rules! data_from {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Data {
            fn from(d: $ty) -> Self {
                Data::$variant(d)
            }
        }
    };
    ($variant:ident, $ty:ty, shared) => {};
}

data_table! {
    CreateLao(CreateLao) => Lao / Create,
    UpdateLao(UpdateLao) => Lao / UpdateProperties,
    StateLao(StateLao) => Lao / State,
    GreetLao(GreetLao) => Lao / Greet,
    CreateMeeting(CreateMeeting) => Meeting / Create,
    StateMeeting(StateMeeting) => Meeting / State,
    CreateRollCall(CreateRollCall) => RollCall / Create,
    OpenRollCall(OpenRollCall) => RollCall / Open (shared),
    ReopenRollCall(OpenRollCall) => RollCall / Reopen (shared),
    CloseRollCall(CloseRollCall) => RollCall / Close,
    ElectionSetup(ElectionSetup) => Election / Setup,
    ElectionKey(ElectionKey) => Election / Key,
    OpenElection(OpenElection) => Election / Open,
    CastVote(CastVote) => Election / CastVote,
    EndElection(EndElection) => Election / End,
    ElectionResult(ElectionResult) => Election / Result,
    ConsensusElect(ConsensusElect) => Consensus / Elect,
    ConsensusElectAccept(ConsensusElectAccept) => Consensus / ElectAccept,
    ConsensusPrepare(ConsensusPrepare) => Consensus / Prepare,
    ConsensusPromise(ConsensusPromise) => Consensus / Promise,
    ConsensusPropose(ConsensusPropose) => Consensus / Propose,
    ConsensusAccept(ConsensusAccept) => Consensus / Accept,
    ConsensusLearn(ConsensusLearn) => Consensus / Learn,
    ConsensusFailure(ConsensusFailure) => Consensus / Failure,
    WitnessMessage(WitnessMessageSignature) => Message / Witness,
    AddChirp(AddChirp) => Chirp / Add,
    DeleteChirp(DeleteChirp) => Chirp / Delete,
    NotifyAddChirp(NotifyChirp) => Chirp / NotifyAdd (shared),
    NotifyDeleteChirp(NotifyChirp) => Chirp / NotifyDelete (shared),
    AddReaction(AddReaction) => Reaction / Add,
    DeleteReaction(DeleteReaction) => Reaction / Delete,
}

impl Data {
    /// Serialize to the JSON bytes that get base64url-encoded and signed.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let Value::Object(mut fields) = self.fields()? else {
            return Err(MessageError::InvalidData(
                "payload did not serialize to an object".into(),
            ));
        };
        let pair = self.object_action();
        fields.insert("object".into(), Value::String(pair.object.to_string()));
        fields.insert("action".into(), Value::String(pair.action.to_string()));
        Ok(serde_json::to_vec(&Value::Object(fields))?)
    }

    /// Decode and validate a payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(mut fields) = value else {
            return Err(MessageError::InvalidData("payload is not a JSON object".into()));
        };
        let object = take_discriminant(&mut fields, "object")?;
        let action = take_discriminant(&mut fields, "action")?;

        let unsupported = || MessageError::Unsupported {
            object: object.clone(),
            action: action.clone(),
        };
        let pair = ObjectAction::new(
            Object::parse(&object).ok_or_else(unsupported)?,
            Action::parse(&action).ok_or_else(unsupported)?,
        );
        Self::from_fields(pair, Value::Object(fields))
    }
}

fn take_discriminant(fields: &mut Map<String, Value>, key: &str) -> Result<String, MessageError> {
    match fields.remove(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(MessageError::InvalidData(format!(
            "`{key}` must be a string, got {other}"
        ))),
        None => Err(MessageError::InvalidData(format!("missing `{key}`"))),
    }
}

// Field-level checks shared by the payload modules.

pub(crate) fn ensure(condition: bool, reason: impl FnOnce() -> String) -> Result<(), MessageError> {
    if condition {
        Ok(())
    } else {
        Err(MessageError::InvalidData(reason()))
    }
}

pub(crate) fn non_negative(field: &str, ts: Timestamp) -> Result<(), MessageError> {
    ensure(!ts.is_negative(), || format!("`{field}` is negative ({ts})"))
}

pub(crate) fn not_before(
    later_field: &str,
    later: Timestamp,
    earlier_field: &str,
    earlier: Timestamp,
) -> Result<(), MessageError> {
    ensure(later >= earlier, || {
        format!("`{later_field}` ({later}) precedes `{earlier_field}` ({earlier})")
    })
}

pub(crate) fn non_empty(field: &str, value: &str) -> Result<(), MessageError> {
    ensure(!value.trim().is_empty(), || format!("`{field}` is empty"))
}
