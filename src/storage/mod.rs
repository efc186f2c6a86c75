//! Shared key/value storage areas
//!
//! A storage area is shared by every tab (session handle) of one origin. Each
//! write that changes a value publishes a [`StorageEvent`] on the area's
//! broadcast channel, which is how sibling tabs learn about logins and logouts.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Buffered events per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 64;

/// Identity of the tab that performed a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(Uuid);

impl TabId {
    /// Writes observed on disk whose author is unknown (another process)
    pub const EXTERNAL: TabId = TabId(Uuid::nil());

    pub fn new() -> Self {
        TabId(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A change to one key of a storage area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub origin: TabId,
}

/// Origin-scoped key/value area shared by all tabs
pub trait StorageArea: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write several values as one operation
    fn set_items(&self, origin: TabId, items: &[(&str, &str)]) -> Result<()>;

    /// Remove several keys as one operation
    fn remove_items(&self, origin: TabId, keys: &[&str]) -> Result<()>;

    /// Receive change notifications for every key
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;

    fn set(&self, origin: TabId, key: &str, value: &str) -> Result<()> {
        self.set_items(origin, &[(key, value)])
    }

    fn remove(&self, origin: TabId, key: &str) -> Result<()> {
        self.remove_items(origin, &[key])
    }
}

/// Broadcast channel carrying storage events
#[derive(Debug)]
pub struct StorageBus {
    tx: broadcast::Sender<StorageEvent>,
}

impl StorageBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: StorageEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}

impl Default for StorageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply writes (`Some`) and removals (`None`) to a map, returning an event
/// for every key whose value actually changed
fn apply_changes<'a>(
    map: &mut HashMap<String, String>,
    origin: TabId,
    changes: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
) -> Vec<StorageEvent> {
    let mut events = Vec::new();
    for (key, value) in changes {
        let old_value = match value {
            Some(v) => map.insert(key.to_string(), v.to_string()),
            None => map.remove(key),
        };
        let new_value = value.map(str::to_string);
        if old_value != new_value {
            events.push(StorageEvent {
                key: key.to_string(),
                old_value,
                new_value,
                origin,
            });
        }
    }
    events
}

/// Events describing how `before` became `after`
fn diff(
    before: &HashMap<String, String>,
    after: &HashMap<String, String>,
    origin: TabId,
) -> Vec<StorageEvent> {
    let mut events: Vec<StorageEvent> = after
        .iter()
        .filter(|(key, value)| before.get(*key) != Some(*value))
        .map(|(key, value)| StorageEvent {
            key: key.clone(),
            old_value: before.get(key).cloned(),
            new_value: Some(value.clone()),
            origin,
        })
        .collect();

    events.extend(
        before
            .iter()
            .filter(|(key, _)| !after.contains_key(*key))
            .map(|(key, value)| StorageEvent {
                key: key.clone(),
                old_value: Some(value.clone()),
                new_value: None,
                origin,
            }),
    );

    events.sort_by(|a, b| a.key.cmp(&b.key));
    events
}
