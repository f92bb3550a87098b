//! Wire data model for the LAO protocol.
//!
//! Three layers, outermost first:
//!
//! - [`jsonrpc`]: the JSON-RPC 2.0 frames exchanged with servers;
//! - [`envelope`]: the signed [`MessageGeneral`] carried by `publish` and
//!   `broadcast`;
//! - [`data`]: the typed payload, a closed union keyed by `(object, action)`.

pub mod data;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod jsonrpc;

pub use data::{Action, Data, Object, ObjectAction, Validate};
pub use envelope::{MessageGeneral, WitnessSignature};
pub use error::MessageError;
pub use jsonrpc::{Answer, AnswerResult, Call, ErrorBody, Frame, Query};
