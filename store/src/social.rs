//! Chirps and reactions. Deletion keeps a tombstone so a late `add` replayed
//! after its `delete` cannot resurrect the post.

use lao_types::{Channel, Hash, MessageId, PublicKey, Timestamp};

use crate::{KeyedRepository, StoreError};

/// A post on a user's social channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chirp {
    /// Id of the message that added it.
    pub id: MessageId,
    pub channel: Channel,
    pub sender: PublicKey,
    /// Emptied on deletion.
    pub text: String,
    /// The chirp this one replies to.
    pub parent_id: Option<MessageId>,
    pub timestamp: Timestamp,
    pub deleted: bool,
}

/// An emoji reaction to a chirp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reaction {
    pub id: MessageId,
    pub sender: PublicKey,
    pub codepoint: String,
    pub chirp_id: MessageId,
    pub timestamp: Timestamp,
    pub deleted: bool,
}

type SocialKey = (Hash, MessageId);

/// Chirps and reactions of every LAO.
pub struct SocialStore {
    chirps: KeyedRepository<SocialKey, Chirp>,
    reactions: KeyedRepository<SocialKey, Reaction>,
}

impl SocialStore {
    pub fn new() -> Self {
        Self {
            chirps: KeyedRepository::new("chirp"),
            reactions: KeyedRepository::new("reaction"),
        }
    }

    pub fn chirps(&self) -> &KeyedRepository<SocialKey, Chirp> {
        &self.chirps
    }

    pub fn reactions(&self) -> &KeyedRepository<SocialKey, Reaction> {
        &self.reactions
    }

    /// Store a chirp. Fails if it is already known, tombstoned or not.
    pub async fn add_chirp(&self, lao: &Hash, chirp: Chirp) -> Result<(), StoreError> {
        self.chirps.insert((lao.clone(), chirp.id.clone()), chirp).await
    }

    /// Tombstone a chirp. Only its author may delete it.
    pub async fn delete_chirp(
        &self,
        lao: &Hash,
        chirp_id: &MessageId,
        requester: &PublicKey,
    ) -> Result<(), StoreError> {
        self.chirps
            .update(&(lao.clone(), chirp_id.clone()), |chirp| {
                if chirp.sender != *requester {
                    return Err(StoreError::Rejected(format!(
                        "{requester} cannot delete chirp {chirp_id} of {}",
                        chirp.sender
                    )));
                }
                chirp.deleted = true;
                chirp.text.clear();
                Ok(())
            })
            .await
    }

    pub async fn chirp_exists(&self, lao: &Hash, chirp_id: &MessageId) -> bool {
        self.chirps.contains(&(lao.clone(), chirp_id.clone())).await
    }

    pub async fn add_reaction(&self, lao: &Hash, reaction: Reaction) -> Result<(), StoreError> {
        self.reactions
            .insert((lao.clone(), reaction.id.clone()), reaction)
            .await
    }

    /// Tombstone a reaction. Only its author may delete it.
    pub async fn delete_reaction(
        &self,
        lao: &Hash,
        reaction_id: &MessageId,
        requester: &PublicKey,
    ) -> Result<(), StoreError> {
        self.reactions
            .update(&(lao.clone(), reaction_id.clone()), |reaction| {
                if reaction.sender != *requester {
                    return Err(StoreError::Rejected(format!(
                        "{requester} cannot delete reaction {reaction_id}"
                    )));
                }
                reaction.deleted = true;
                Ok(())
            })
            .await
    }

    /// Live chirps of a LAO, oldest first.
    pub async fn feed(&self, lao: &Hash) -> Vec<Chirp> {
        let mut chirps: Vec<Chirp> = self
            .chirps
            .snapshot(|(l, _)| l == lao)
            .await
            .into_iter()
            .map(|(_, c)| c)
            .filter(|c| !c.deleted)
            .collect();
        chirps.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        chirps
    }

    pub async fn remove_lao(&self, lao: &Hash) {
        self.chirps.retain(|(l, _)| l != lao).await;
        self.reactions.retain(|(l, _)| l != lao).await;
    }
}

impl Default for SocialStore {
    fn default() -> Self {
        Self::new()
    }
}
