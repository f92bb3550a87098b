//! Bounded FIFO map of recently seen ids.
//!
//! When full, the oldest entry is evicted to make room for a new insertion.
//! Lookups are O(1) via a `HashMap`. Each entry carries a tag (usually the
//! LAO it belongs to) so a whole group can be forgotten at once.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash as StdHash;

/// A bounded map from recently seen keys to a tag.
pub struct RecentMap<K, V> {
    map: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: StdHash + Eq + Clone, V> RecentMap<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Insert `key`, evicting the oldest entry if at capacity. Re-inserting
    /// a present key only updates its tag.
    pub fn insert(&mut self, key: K, tag: V) {
        if self.capacity == 0 {
            return;
        }
        if let Some(existing) = self.map.get_mut(&key) {
            *existing = tag;
            return;
        }
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(evicted) => {
                    self.map.remove(&evicted);
                }
                None => break,
            }
        }
        self.map.insert(key.clone(), tag);
        self.order.push_back(key);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    /// Drop every entry for which `remove` holds. Returns how many went.
    pub fn remove_where(&mut self, remove: impl Fn(&K, &V) -> bool) -> usize {
        let before = self.map.len();
        self.map.retain(|k, v| !remove(k, v));
        let map = &self.map;
        self.order.retain(|k| map.contains_key(k));
        before - self.map.len()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
