//! Persisted set of subscribed channels, replayed on reconnect.

use lao_types::Channel;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::StoreError;

/// Where the set of subscribed channels is kept between sessions.
pub trait SubscriptionStore: Send + Sync {
    fn load(&self) -> Result<BTreeSet<Channel>, StoreError>;

    /// Returns `true` if the channel was not already present.
    fn add(&self, channel: &Channel) -> Result<bool, StoreError>;

    /// Returns `true` if the channel was present.
    fn remove(&self, channel: &Channel) -> Result<bool, StoreError>;
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("subscription lock poisoned".into())
}

/// Subscriptions that live as long as the process.
#[derive(Default)]
pub struct MemorySubscriptionStore {
    channels: Mutex<BTreeSet<Channel>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn load(&self) -> Result<BTreeSet<Channel>, StoreError> {
        Ok(self.channels.lock().map_err(poisoned)?.clone())
    }

    fn add(&self, channel: &Channel) -> Result<bool, StoreError> {
        Ok(self.channels.lock().map_err(poisoned)?.insert(channel.clone()))
    }

    fn remove(&self, channel: &Channel) -> Result<bool, StoreError> {
        Ok(self.channels.lock().map_err(poisoned)?.remove(channel))
    }
}

/// A JSON array of channel paths on disk, rewritten atomically on change.
pub struct FileSubscriptionStore {
    path: PathBuf,
    channels: Mutex<BTreeSet<Channel>>,
}

impl FileSubscriptionStore {
    /// Open (or start) the store at `path`. A missing file is an empty set.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let channels = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<BTreeSet<Channel>>(&text)
                .map_err(|e| StoreError::Corruption(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(StoreError::Backend(format!("{}: {e}", path.display()))),
        };
        tracing::debug!(path = %path.display(), count = channels.len(), "loaded subscriptions");
        Ok(Self {
            path,
            channels: Mutex::new(channels),
        })
    }

    fn persist(&self, channels: &BTreeSet<Channel>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(channels)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| StoreError::Backend(format!("{}: {e}", self.path.display())))
    }
}

impl SubscriptionStore for FileSubscriptionStore {
    fn load(&self) -> Result<BTreeSet<Channel>, StoreError> {
        Ok(self.channels.lock().map_err(poisoned)?.clone())
    }

    fn add(&self, channel: &Channel) -> Result<bool, StoreError> {
        let mut channels = self.channels.lock().map_err(poisoned)?;
        if !channels.insert(channel.clone()) {
            return Ok(false);
        }
        self.persist(&channels)?;
        Ok(true)
    }

    fn remove(&self, channel: &Channel) -> Result<bool, StoreError> {
        let mut channels = self.channels.lock().map_err(poisoned)?;
        if !channels.remove(channel) {
            return Ok(false);
        }
        self.persist(&channels)?;
        Ok(true)
    }
}
