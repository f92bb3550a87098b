//! Roll calls.
//!
//! Each transition publishes a fresh update id, and the next transition
//! refers to the roll call by that id. [`RollCallStore`] keeps the entity
//! under its creation id and resolves any later id back to it.

use lao_messages::data::{CloseRollCall, CreateRollCall, OpenRollCall};
use lao_types::{Hash, PublicKey, Timestamp};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::{EntityKey, KeyedRepository, StoreError};

/// Lifecycle of a roll call. A closed roll call can be reopened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RollCallState {
    Created,
    Opened,
    Closed,
}

/// A roll call and the attendees it registered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RollCall {
    /// The id of the latest transition.
    pub id: Hash,
    /// The creation id, which never changes.
    pub persistent_id: Hash,
    pub name: String,
    pub creation: Timestamp,
    pub proposed_start: Timestamp,
    pub proposed_end: Timestamp,
    pub location: String,
    pub description: Option<String>,
    pub state: RollCallState,
    /// Attendees of the latest close.
    pub attendees: BTreeSet<PublicKey>,
    /// When it was last opened.
    pub start: Option<Timestamp>,
    /// When it was last closed.
    pub end: Option<Timestamp>,
    /// Witnesses signed the latest transition.
    pub witnessed: bool,
}

impl RollCall {
    pub fn from_create(create: &CreateRollCall) -> Self {
        Self {
            id: create.id.clone(),
            persistent_id: create.id.clone(),
            name: create.name.clone(),
            creation: create.creation,
            proposed_start: create.proposed_start,
            proposed_end: create.proposed_end,
            location: create.location.clone(),
            description: create.description.clone(),
            state: RollCallState::Created,
            attendees: BTreeSet::new(),
            start: None,
            end: None,
            witnessed: false,
        }
    }

    /// `open` from `Created`, `reopen` from `Closed`.
    pub fn open(&mut self, open: &OpenRollCall, reopen: bool) -> Result<(), String> {
        let allowed = if reopen {
            self.state == RollCallState::Closed
        } else {
            self.state == RollCallState::Created
        };
        if !allowed {
            return Err(format!("cannot open roll call in state {:?}", self.state));
        }
        self.id = open.update_id.clone();
        self.state = RollCallState::Opened;
        self.start = Some(open.opened_at);
        self.witnessed = false;
        Ok(())
    }

    /// Close an opened roll call with its final attendee list.
    pub fn close(&mut self, close: &CloseRollCall) -> Result<(), String> {
        if self.state != RollCallState::Opened {
            return Err(format!("cannot close roll call in state {:?}", self.state));
        }
        self.id = close.update_id.clone();
        self.state = RollCallState::Closed;
        self.end = Some(close.closed_at);
        self.attendees = close.attendees.iter().copied().collect();
        self.witnessed = false;
        Ok(())
    }
}

/// Roll calls keyed by creation id, reachable through any id they carried.
pub struct RollCallStore {
    repo: KeyedRepository<EntityKey, RollCall>,
    /// Every id a roll call has carried, mapped to its persistent id.
    aliases: RwLock<HashMap<EntityKey, Hash>>,
}

impl RollCallStore {
    pub fn new() -> Self {
        Self {
            repo: KeyedRepository::new("roll_call"),
            aliases: RwLock::new(HashMap::new()),
        }
    }

    pub fn repository(&self) -> &KeyedRepository<EntityKey, RollCall> {
        &self.repo
    }

    /// Store a new roll call. Fails if the id is taken.
    pub async fn create(&self, lao: &Hash, roll_call: RollCall) -> Result<(), StoreError> {
        let key = EntityKey::new(lao, &roll_call.persistent_id);
        self.repo.insert(key.clone(), roll_call).await?;
        self.aliases.write().await.insert(key.clone(), key.id);
        Ok(())
    }

    /// The persistent key of the roll call that has carried `id`.
    pub async fn resolve(&self, lao: &Hash, id: &Hash) -> Option<EntityKey> {
        self.aliases
            .read()
            .await
            .get(&EntityKey::new(lao, id))
            .map(|persistent| EntityKey::new(lao, persistent))
    }

    /// The roll call that has carried `id`.
    pub async fn get(&self, lao: &Hash, id: &Hash) -> Option<RollCall> {
        let key = self.resolve(lao, id).await?;
        self.repo.get(&key).await
    }

    /// Apply a transition addressed by any id of the roll call, and register
    /// the id the transition produces.
    pub async fn transition<E, F>(&self, lao: &Hash, id: &Hash, f: F) -> Result<RollCall, E>
    where
        F: FnOnce(&mut RollCall) -> Result<(), E>,
        E: From<StoreError>,
    {
        let key = self
            .resolve(lao, id)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("roll_call: {id}")))?;
        let updated = self
            .repo
            .update(&key, |rc| {
                f(rc)?;
                Ok::<_, E>(rc.clone())
            })
            .await?;
        self.aliases
            .write()
            .await
            .insert(EntityKey::new(lao, &updated.id), key.id);
        Ok(updated)
    }

    /// Mark the roll call witnessed if `id` is still its latest transition.
    pub async fn mark_witnessed(&self, lao: &Hash, id: &Hash) -> Result<bool, StoreError> {
        let key = self
            .resolve(lao, id)
            .await
            .ok_or_else(|| StoreError::NotFound(format!("roll_call: {id}")))?;
        self.repo
            .update(&key, |rc| {
                // Only the transition that was witnessed gets promoted.
                let current = rc.id == *id;
                if current {
                    rc.witnessed = true;
                }
                Ok(current)
            })
            .await
    }

    pub async fn remove_lao(&self, lao: &Hash) -> usize {
        self.aliases.write().await.retain(|k, _| k.lao != *lao);
        self.repo.retain(|k| k.lao != *lao).await
    }
}

impl Default for RollCallStore {
    fn default() -> Self {
        Self::new()
    }
}
