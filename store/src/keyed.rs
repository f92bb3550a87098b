//! Generic per-key repository.
//!
//! The outer map is only locked long enough to find or create an entry; the
//! entity itself has its own mutex, held for the whole of one [`update`].
//! Updates work on a copy that replaces the stored value only when the
//! closure succeeds, so a failed transition leaves no trace.
//!
//! [`update`]: KeyedRepository::update

use lao_types::Hash;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash as StdHash;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::StoreError;

const CHANGE_CAPACITY: usize = 256;

/// Composite key for entities that live inside a LAO.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    /// LAO the entity lives in.
    pub lao: Hash,
    /// Id of the entity within the LAO.
    pub id: Hash,
}

impl EntityKey {
    pub fn new(lao: &Hash, id: &Hash) -> Self {
        Self {
            lao: lao.clone(),
            id: id.clone(),
        }
    }
}

/// A committed change, published after the entity lock is released.
#[derive(Clone, Debug, PartialEq)]
pub enum Change<K, V> {
    Upserted { key: K, value: V },
    Removed { key: K },
}

/// Entities of one kind, each behind its own lock, with a stream of
/// committed changes.
pub struct KeyedRepository<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, Arc<Mutex<V>>>>,
    changes: broadcast::Sender<Change<K, V>>,
}

impl<K, V> KeyedRepository<K, V>
where
    K: Clone + Eq + StdHash + Debug,
    V: Clone,
{
    /// An empty repository. `name` shows up in errors and logs.
    pub fn new(name: &'static str) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            changes,
        }
    }

    /// Insert a new entity; fails if the key is taken.
    pub async fn insert(&self, key: K, value: V) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write().await;
            if entries.contains_key(&key) {
                return Err(StoreError::Duplicate(format!("{}: {key:?}", self.name)));
            }
            entries.insert(key.clone(), Arc::new(Mutex::new(value.clone())));
        }
        self.publish(Change::Upserted { key, value });
        Ok(())
    }

    /// Insert or replace.
    pub async fn upsert(&self, key: K, value: V) {
        let entry = {
            let mut entries = self.entries.write().await;
            Arc::clone(
                entries
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(value.clone()))),
            )
        };
        *entry.lock().await = value.clone();
        self.publish(Change::Upserted { key, value });
    }

    /// Apply `f` to a copy of the entity under its lock and store the copy if
    /// `f` succeeds.
    pub async fn update<R, E, F>(&self, key: &K, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut V) -> Result<R, E>,
        E: From<StoreError>,
    {
        let entry = self.entry(key).await?;
        let (result, value) = {
            let mut guard = entry.lock().await;
            let mut next = guard.clone();
            let result = f(&mut next)?;
            *guard = next.clone();
            (result, next)
        };
        self.publish(Change::Upserted {
            key: key.clone(),
            value,
        });
        Ok(result)
    }

    /// Snapshot of one entity.
    pub async fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.read().await.get(key).cloned()?;
        let value = entry.lock().await.clone();
        Some(value)
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Remove the entity, publishing [`Change::Removed`] if it was present.
    pub async fn remove(&self, key: &K) -> Option<V> {
        let entry = self.entries.write().await.remove(key)?;
        let value = entry.lock().await.clone();
        self.publish(Change::Removed { key: key.clone() });
        Some(value)
    }

    /// Drop every entity whose key fails `keep`. Returns how many went.
    pub async fn retain(&self, keep: impl Fn(&K) -> bool) -> usize {
        let removed: Vec<K> = {
            let mut entries = self.entries.write().await;
            let doomed: Vec<K> = entries.keys().filter(|k| !keep(k)).cloned().collect();
            for key in &doomed {
                entries.remove(key);
            }
            doomed
        };
        let count = removed.len();
        for key in removed {
            self.publish(Change::Removed { key });
        }
        count
    }

    /// Snapshots of every entity matching `filter`.
    pub async fn snapshot(&self, filter: impl Fn(&K) -> bool) -> Vec<(K, V)> {
        let entries: Vec<(K, Arc<Mutex<V>>)> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(k, _)| filter(k))
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        let mut out = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            let value = entry.lock().await.clone();
            out.push((key, value));
        }
        out
    }

    /// Number of entities.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Stream of committed changes. Lagging receivers lose the oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<Change<K, V>> {
        self.changes.subscribe()
    }

    async fn entry(&self, key: &K) -> Result<Arc<Mutex<V>>, StoreError> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}: {key:?}", self.name)))
    }

    fn publish(&self, change: Change<K, V>) {
        // No receivers is fine.
        let _ = self.changes.send(change);
    }
}
