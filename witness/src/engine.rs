//! Open witness entries and their quorum.

use lao_types::{Hash, MessageId, PublicKey, RecentMap};
use std::collections::{BTreeSet, HashMap};

use crate::{WitnessError, WitnessMessage, WitnessSubject};

/// Every LAO witness must sign.
pub fn witness_quorum(witnesses: usize) -> usize {
    witnesses
}

/// A message whose witnessing completed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Promotion {
    pub message_id: MessageId,
    pub lao_id: Hash,
    pub subject: WitnessSubject,
}

impl From<&WitnessMessage> for Promotion {
    fn from(message: &WitnessMessage) -> Self {
        Self {
            message_id: message.message_id.clone(),
            lao_id: message.lao_id.clone(),
            subject: message.subject.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Duplicate,
    Pending { missing: usize },
    /// The LAO has no witnesses, so nothing needs to be collected.
    Promoted(Promotion),
}

/// How many retired ids are remembered per engine.
pub const RETIRED_CAPACITY: usize = 16_384;

pub struct WitnessEngine {
    entries: HashMap<MessageId, WitnessMessage>,
    /// Recently retired entries, so late signatures are not mistaken for
    /// unknown messages. Oldest ids are evicted first.
    retired: RecentMap<MessageId, Hash>,
}

impl Default for WitnessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WitnessEngine {
    pub fn new() -> Self {
        Self::with_retired_capacity(RETIRED_CAPACITY)
    }

    pub fn with_retired_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            retired: RecentMap::new(capacity),
        }
    }

    /// Start collecting signatures from `witnesses` for `message`.
    pub fn register(&mut self, mut message: WitnessMessage, witnesses: &BTreeSet<PublicKey>) -> RegisterOutcome {
        if self.entries.contains_key(&message.message_id) || self.retired.contains(&message.message_id) {
            return RegisterOutcome::Duplicate;
        }
        message.required = witnesses.clone();
        if message.is_complete() {
            let promotion = Promotion::from(&message);
            self.retired.insert(message.message_id, message.lao_id);
            return RegisterOutcome::Promoted(promotion);
        }
        let missing = message.missing();
        tracing::debug!(
            message_id = %message.message_id,
            lao = %message.lao_id,
            title = %message.title,
            missing,
            "registered for witnessing"
        );
        self.entries.insert(message.message_id.clone(), message);
        RegisterOutcome::Pending { missing }
    }

    /// Record a witness signature. Returns `true` when this signature
    /// completed the quorum; the entry is then retired.
    pub fn add_signature(&mut self, message_id: &MessageId, witness: PublicKey) -> Result<bool, WitnessError> {
        if self.retired.contains(message_id) {
            return Ok(false);
        }
        let entry = self
            .entries
            .get_mut(message_id)
            .ok_or_else(|| WitnessError::UnknownMessage(message_id.clone()))?;
        if !entry.required.contains(&witness) {
            return Err(WitnessError::NotAWitness(witness));
        }
        if !entry.witnesses.insert(witness) || !entry.is_complete() {
            return Ok(false);
        }
        self.retire(message_id);
        Ok(true)
    }

    /// Re-check every entry of `lao` against a new witness list. Returns the
    /// entries that are now complete, already retired.
    pub fn reevaluate(&mut self, lao: &Hash, witnesses: &BTreeSet<PublicKey>) -> Vec<Promotion> {
        let mut done = Vec::new();
        for entry in self.entries.values_mut().filter(|e| e.lao_id == *lao) {
            entry.required = witnesses.clone();
            entry.witnesses.retain(|w| witnesses.contains(w));
            if entry.is_complete() {
                done.push(Promotion::from(&*entry));
            }
        }
        for promotion in &done {
            self.retire(&promotion.message_id);
        }
        done
    }

    /// Forget everything about `lao`. Returns how many open entries went.
    pub fn teardown(&mut self, lao: &Hash) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.lao_id != *lao);
        self.retired.remove_where(|_, l| l == lao);
        before - self.entries.len()
    }

    pub fn get(&self, message_id: &MessageId) -> Option<&WitnessMessage> {
        self.entries.get(message_id)
    }

    pub fn is_retired(&self, message_id: &MessageId) -> bool {
        self.retired.contains(message_id)
    }

    /// Number of retired ids still remembered.
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Open entries of a LAO, oldest first.
    pub fn pending(&self, lao: &Hash) -> Vec<&WitnessMessage> {
        let mut open: Vec<&WitnessMessage> = self.entries.values().filter(|e| e.lao_id == *lao).collect();
        open.sort_by(|a, b| (a.created_at, &a.message_id).cmp(&(b.created_at, &b.message_id)));
        open
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn retire(&mut self, message_id: &MessageId) {
        if let Some(entry) = self.entries.remove(message_id) {
            tracing::info!(
                message_id = %entry.message_id,
                lao = %entry.lao_id,
                witnesses = entry.witnesses.len(),
                "message witnessed"
            );
            self.retired.insert(entry.message_id, entry.lao_id);
        }
    }
}
