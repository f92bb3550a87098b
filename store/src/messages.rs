//! Log of applied messages, for idempotence and local catch-up.

use lao_messages::{MessageGeneral, WitnessSignature};
use lao_types::{Channel, Hash, MessageId};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An applied message and the channel it arrived on. Witness signatures
/// are attached as they are accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    pub channel: Channel,
    pub message: MessageGeneral,
}

#[derive(Default)]
struct Inner {
    by_id: HashMap<MessageId, StoredMessage>,
    by_channel: HashMap<Channel, Vec<MessageId>>,
}

/// Every applied message, by id and by channel.
#[derive(Default)]
pub struct MessageRepository {
    inner: RwLock<Inner>,
}

impl MessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message. Returns `false` if its id was already present.
    pub async fn insert(&self, channel: &Channel, message: MessageGeneral) -> bool {
        let mut inner = self.inner.write().await;
        if inner.by_id.contains_key(&message.message_id) {
            return false;
        }
        let id = message.message_id.clone();
        inner
            .by_channel
            .entry(channel.clone())
            .or_default()
            .push(id.clone());
        inner.by_id.insert(
            id,
            StoredMessage {
                channel: channel.clone(),
                message,
            },
        );
        true
    }

    /// Whether the message was already applied.
    pub async fn contains(&self, id: &MessageId) -> bool {
        self.inner.read().await.by_id.contains_key(id)
    }

    pub async fn get(&self, id: &MessageId) -> Option<StoredMessage> {
        self.inner.read().await.by_id.get(id).cloned()
    }

    /// Messages of a channel in the order they were applied.
    pub async fn channel_messages(&self, channel: &Channel) -> Vec<MessageGeneral> {
        let inner = self.inner.read().await;
        inner
            .by_channel
            .get(channel)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.by_id.get(id).map(|m| m.message.clone()))
            .collect()
    }

    /// Attach a witness signature to a stored message. Returns `false` if the
    /// message is unknown or the witness had already signed.
    pub async fn add_witness_signature(&self, id: &MessageId, signature: WitnessSignature) -> bool {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.by_id.get_mut(id) else {
            return false;
        };
        let signatures = &mut stored.message.witness_signatures;
        if signatures.iter().any(|s| s.witness == signature.witness) {
            return false;
        }
        signatures.push(signature);
        true
    }

    /// Forget every message of a LAO's channels.
    pub async fn remove_lao(&self, lao: &Hash) -> usize {
        let mut inner = self.inner.write().await;
        let channels: Vec<Channel> = inner
            .by_channel
            .keys()
            .filter(|c| c.lao_id().as_ref() == Some(lao))
            .cloned()
            .collect();
        let mut removed = 0;
        for channel in channels {
            for id in inner.by_channel.remove(&channel).unwrap_or_default() {
                inner.by_id.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }
}
