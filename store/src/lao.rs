//! The LAO entity.

use lao_messages::data::{CreateLao, StateLao, UpdateLao};
use lao_types::{Channel, Hash, MessageId, PublicKey, Timestamp};
use std::collections::BTreeSet;

/// A LAO as known locally: its properties as of the latest accepted
/// update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lao {
    pub id: Hash,
    pub name: String,
    pub creation: Timestamp,
    /// Creation time of the update that produced the current properties.
    pub last_modified: Timestamp,
    /// Only key allowed to create or change LAO-level entities.
    pub organizer: PublicKey,
    pub witnesses: BTreeSet<PublicKey>,
    /// The LAO's own channel, `/root/<id>`.
    pub channel: Channel,
    /// The message that produced the current properties.
    pub modification_id: MessageId,
    /// Every witness has signed the current properties.
    pub witnessed: bool,
}

impl Lao {
    pub fn from_create(create: &CreateLao, message_id: MessageId) -> Self {
        Self {
            id: create.id.clone(),
            name: create.name.clone(),
            creation: create.creation,
            last_modified: create.creation,
            organizer: create.organizer,
            witnesses: create.witnesses.iter().copied().collect(),
            channel: Channel::lao(&create.id),
            modification_id: message_id,
            witnessed: create.witnesses.is_empty(),
        }
    }

    /// Apply an organizer's property update. Ignored if older than the
    /// current properties.
    pub fn apply_update(&mut self, update: &UpdateLao, message_id: MessageId) -> bool {
        if update.last_modified < self.last_modified {
            return false;
        }
        self.name = update.name.clone();
        self.last_modified = update.last_modified;
        self.witnesses = update.witnesses.iter().copied().collect();
        self.modification_id = message_id;
        self.witnessed = self.witnesses.is_empty();
        true
    }

    /// Apply a certified state. The caller has checked the modification
    /// signatures.
    pub fn apply_state(&mut self, state: &StateLao) -> bool {
        if state.last_modified < self.last_modified {
            return false;
        }
        self.name = state.name.clone();
        self.last_modified = state.last_modified;
        self.witnesses = state.witnesses.iter().copied().collect();
        self.modification_id = state.modification_id.clone();
        self.witnessed = true;
        true
    }

    pub fn is_organizer(&self, key: &PublicKey) -> bool {
        self.organizer == *key
    }

    pub fn is_witness(&self, key: &PublicKey) -> bool {
        self.witnesses.contains(key)
    }

    /// The consensus participants: the witnesses, or the organizer alone when
    /// there are none.
    pub fn consensus_nodes(&self) -> BTreeSet<PublicKey> {
        if self.witnesses.is_empty() {
            BTreeSet::from([self.organizer])
        } else {
            self.witnesses.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(witnesses: Vec<PublicKey>) -> CreateLao {
        CreateLao::new("LAO", Timestamp::new(10), PublicKey([1u8; 32]), witnesses)
    }

    fn mid(b: u8) -> MessageId {
        MessageId::from_bytes([b; 32])
    }

    #[test]
    fn nodes_fall_back_to_organizer() {
        let lao = Lao::from_create(&create(vec![]), mid(1));
        assert_eq!(lao.consensus_nodes(), BTreeSet::from([PublicKey([1u8; 32])]));
        assert!(lao.witnessed);

        let w = PublicKey([2u8; 32]);
        let lao = Lao::from_create(&create(vec![w]), mid(1));
        assert_eq!(lao.consensus_nodes(), BTreeSet::from([w]));
        assert!(!lao.witnessed);
    }

    #[test]
    fn stale_update_is_ignored() {
        let mut lao = Lao::from_create(&create(vec![]), mid(1));
        let update = UpdateLao {
            id: lao.id.clone(),
            name: "Renamed".into(),
            last_modified: Timestamp::new(20),
            witnesses: vec![PublicKey([3u8; 32])],
        };
        assert!(lao.apply_update(&update, mid(2)));
        assert_eq!(lao.name, "Renamed");
        assert!(!lao.witnessed);

        let stale = UpdateLao {
            last_modified: Timestamp::new(15),
            name: "Old".into(),
            ..update
        };
        assert!(!lao.apply_update(&stale, mid(3)));
        assert_eq!(lao.name, "Renamed");
        assert_eq!(lao.modification_id, mid(2));
    }
}
