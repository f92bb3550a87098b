//! Repositories for LAO client state.
//!
//! Every entity kind has one authoritative [`KeyedRepository`]. Each entity
//! sits behind its own lock, so writers to different entities never contend,
//! and readers only ever see cloned snapshots.

pub mod error;
pub mod keyed;
pub mod lao;
pub mod meeting;
pub mod messages;
pub mod roll_call;
pub mod social;
pub mod subscriptions;

pub use error::StoreError;
pub use keyed::{Change, EntityKey, KeyedRepository};
pub use lao::Lao;
pub use meeting::Meeting;
pub use messages::{MessageRepository, StoredMessage};
pub use roll_call::{RollCall, RollCallState, RollCallStore};
pub use social::{Chirp, Reaction, SocialStore};
pub use subscriptions::{FileSubscriptionStore, MemorySubscriptionStore, SubscriptionStore};
