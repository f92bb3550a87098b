use lao_types::{Hash, MessageId, PublicKey, Timestamp};
use std::collections::BTreeSet;

/// The fact that becomes witnessed once quorum is reached.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum WitnessSubject {
    /// LAO creation or property update.
    Lao,
    RollCall(Hash),
    Meeting(Hash),
    Election(Hash),
    /// Nothing to promote beyond the signature record.
    Message,
}

/// A message waiting for witness signatures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WitnessMessage {
    pub message_id: MessageId,
    pub lao_id: Hash,
    pub subject: WitnessSubject,
    /// Witnesses that signed so far.
    pub witnesses: BTreeSet<PublicKey>,
    /// Witnesses whose signature is needed.
    pub required: BTreeSet<PublicKey>,
    pub title: String,
    pub description: String,
    pub created_at: Timestamp,
}

impl WitnessMessage {
    pub fn new(
        message_id: MessageId,
        lao_id: Hash,
        subject: WitnessSubject,
        title: impl Into<String>,
        description: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            message_id,
            lao_id,
            subject,
            witnesses: BTreeSet::new(),
            required: BTreeSet::new(),
            title: title.into(),
            description: description.into(),
            created_at,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.required.is_subset(&self.witnesses)
    }

    /// Signatures still missing.
    pub fn missing(&self) -> usize {
        self.required.difference(&self.witnesses).count()
    }
}
