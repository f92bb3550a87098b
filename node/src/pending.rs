//! Pending queue: messages whose dependency is not known yet.
//!
//! A message that refers to a LAO, election, roll call, elect or message we
//! have not seen is parked here under the missing id. Once a handler
//! satisfies that id, every message waiting on it is drained and
//! re-dispatched on its channel.

use lao_messages::MessageGeneral;
use lao_types::{Channel, Hash, MessageId, Timestamp};
use std::collections::HashMap;

/// A message waiting for its dependency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEntry {
    pub channel: Channel,
    pub message: MessageGeneral,
    /// When it was parked.
    pub parked_at: Timestamp,
}

impl PendingEntry {
    fn lao(&self) -> Option<Hash> {
        self.channel.lao_id()
    }
}

/// Maps `dependency -> entries waiting for it`, with a bound on the total
/// number of entries. Every entry carries its parking sequence number so
/// entries released together go back out in the order they were parked.
pub struct PendingQueue {
    entries: HashMap<Hash, Vec<(u64, PendingEntry)>>,
    count: usize,
    max_size: usize,
    next_seq: u64,
}

impl PendingQueue {
    /// An empty queue holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            count: 0,
            max_size,
            next_seq: 0,
        }
    }

    /// Park `entry` until `dependency` is satisfied.
    ///
    /// Returns `false` if the queue is full. Parking the same message twice
    /// under the same dependency is a no-op that succeeds.
    pub fn insert(&mut self, dependency: Hash, entry: PendingEntry) -> bool {
        let parked = self.entries.get(&dependency).is_some_and(|waiting| {
            waiting
                .iter()
                .any(|(_, e)| e.message.message_id == entry.message.message_id)
        });
        if parked {
            return true;
        }
        if self.count >= self.max_size {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.entry(dependency).or_default().push((seq, entry));
        self.count += 1;
        true
    }

    /// Drain every entry that was waiting for `dependency`, oldest first.
    pub fn take(&mut self, dependency: &Hash) -> Vec<PendingEntry> {
        self.take_all(std::slice::from_ref(dependency))
            .into_iter()
            .map(|(_, entry)| entry)
            .collect()
    }

    /// Drain every entry waiting for any of `dependencies`, in parking order
    /// across all of them. Each entry comes with the dependency it waited on.
    pub fn take_all(&mut self, dependencies: &[Hash]) -> Vec<(Hash, PendingEntry)> {
        let mut drained: Vec<(u64, Hash, PendingEntry)> = Vec::new();
        for dependency in dependencies {
            if let Some(waiting) = self.entries.remove(dependency) {
                self.count -= waiting.len();
                drained.extend(waiting.into_iter().map(|(seq, e)| (seq, dependency.clone(), e)));
            }
        }
        drained.sort_by_key(|(seq, _, _)| *seq);
        drained.into_iter().map(|(_, dep, e)| (dep, e)).collect()
    }

    /// Whether the message is parked under any dependency.
    pub fn is_waiting(&self, message_id: &MessageId) -> bool {
        self.entries
            .values()
            .flatten()
            .any(|(_, e)| e.message.message_id == *message_id)
    }

    /// Drop every entry parked on a channel of `lao`. Returns how many went.
    pub fn remove_lao(&mut self, lao: &Hash) -> usize {
        self.retain(|e| e.lao().as_ref() != Some(lao))
    }

    /// Remove entries parked more than `max_age_secs` before `now`.
    pub fn clear_expired(&mut self, max_age_secs: i64, now: Timestamp) -> usize {
        self.retain(|e| now.as_secs().saturating_sub(e.parked_at.as_secs()) < max_age_secs)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Number of distinct dependencies with something waiting on them.
    pub fn dependencies(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn retain(&mut self, keep: impl Fn(&PendingEntry) -> bool) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(_, e)| keep(e));
            removed += before - entries.len();
            !entries.is_empty()
        });
        self.count -= removed;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lao_crypto::generate_keypair;
    use lao_messages::data::AddChirp;
    use lao_messages::Data;

    fn lao(b: u8) -> Hash {
        Hash::from_bytes([b; 32])
    }

    fn entry(lao_id: &Hash, text: &str, parked_at: i64) -> PendingEntry {
        let data = Data::AddChirp(AddChirp {
            text: text.into(),
            parent_id: None,
            timestamp: Timestamp::new(1),
        });
        PendingEntry {
            channel: Channel::lao(lao_id).sub_channel("social"),
            message: MessageGeneral::new(&generate_keypair(), &data).unwrap(),
            parked_at: Timestamp::new(parked_at),
        }
    }

    #[test]
    fn insert_and_take_dependents() {
        let mut queue = PendingQueue::new(10);
        let dep = lao(0xAA);
        let a = entry(&lao(1), "a", 1);
        let b = entry(&lao(1), "b", 2);

        assert!(queue.insert(dep.clone(), a.clone()));
        assert!(queue.insert(dep.clone(), b.clone()));
        assert_eq!(queue.len(), 2);
        assert!(queue.is_waiting(&a.message.message_id));

        assert_eq!(queue.take(&dep), vec![a, b]);
        assert!(queue.is_empty());
        assert!(queue.take(&dep).is_empty());
    }

    #[test]
    fn reparking_is_idempotent() {
        let mut queue = PendingQueue::new(10);
        let e = entry(&lao(1), "a", 1);
        assert!(queue.insert(lao(9), e.clone()));
        assert!(queue.insert(lao(9), e));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn full_queue_refuses() {
        let mut queue = PendingQueue::new(1);
        assert!(queue.insert(lao(9), entry(&lao(1), "a", 1)));
        assert!(!queue.insert(lao(8), entry(&lao(1), "b", 1)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dependencies(), 1);
    }

    #[test]
    fn teardown_drops_only_that_lao() {
        let mut queue = PendingQueue::new(10);
        queue.insert(lao(9), entry(&lao(1), "a", 1));
        queue.insert(lao(9), entry(&lao(2), "b", 1));
        queue.insert(lao(8), entry(&lao(1), "c", 1));

        assert_eq!(queue.remove_lao(&lao(1)), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.take(&lao(9)).len(), 1);
        assert!(queue.take(&lao(8)).is_empty());
    }

    #[test]
    fn take_all_keeps_parking_order_across_dependencies() {
        let mut queue = PendingQueue::new(10);
        let first = entry(&lao(1), "first", 1);
        let second = entry(&lao(1), "second", 1);
        let third = entry(&lao(1), "third", 1);
        queue.insert(lao(8), first.clone());
        queue.insert(lao(9), second.clone());
        queue.insert(lao(8), third.clone());

        let drained = queue.take_all(&[lao(9), lao(8)]);
        let order: Vec<_> = drained.iter().map(|(_, e)| e.message.message_id.clone()).collect();
        assert_eq!(
            order,
            vec![first.message.message_id, second.message.message_id, third.message.message_id]
        );
        assert_eq!(drained[1].0, lao(9));
        assert!(queue.is_empty());
    }

    #[test]
    fn clear_expired_removes_old_entries() {
        let mut queue = PendingQueue::new(10);
        queue.insert(lao(9), entry(&lao(1), "old", 100));
        queue.insert(lao(9), entry(&lao(1), "new", 190));

        assert_eq!(queue.clear_expired(60, Timestamp::new(200)), 1);
        assert_eq!(queue.len(), 1);
    }
}
