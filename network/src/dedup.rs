//! Rolling set of recently seen message ids.
//!
//! Every server relays the same broadcasts, and catch-up replays what was
//! already pushed, so inbound messages are filtered by message id before
//! delivery.

use lao_types::MessageId;
use std::collections::HashSet;
use std::collections::VecDeque;

/// Default dedup capacity: track the last 65 536 message ids.
pub const DEFAULT_DEDUP_CAPACITY: usize = 65_536;

/// Keeps the last `capacity` message ids in insertion order. The oldest id is
/// evicted when a new one arrives at capacity.
pub struct MessageDedup {
    capacity: usize,
    ids: HashSet<[u8; 32]>,
    order: VecDeque<[u8; 32]>,
}

impl MessageDedup {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Returns `true` if the id was seen before; otherwise records it.
    pub fn is_duplicate(&mut self, id: &MessageId) -> bool {
        let key = *id.as_bytes();
        if self.ids.contains(&key) {
            return true;
        }
        if self.ids.len() >= self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.ids.remove(&old);
            }
        }
        self.ids.insert(key);
        self.order.push_back(key);
        false
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for MessageDedup {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
