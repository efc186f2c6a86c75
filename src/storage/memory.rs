//! In-process storage area

use super::{apply_changes, StorageArea, StorageBus, StorageEvent, TabId};
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Storage area for tabs that live in the same process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    bus: StorageBus,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    fn commit(&self, origin: TabId, changes: Vec<(&str, Option<&str>)>) {
        let mut items = self.items.lock();
        // Publish under the lock so subscribers see writes in commit order
        for event in apply_changes(&mut items, origin, changes) {
            self.bus.publish(event);
        }
    }
}

impl StorageArea for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_items(&self, origin: TabId, items: &[(&str, &str)]) -> Result<()> {
        self.commit(origin, items.iter().map(|(k, v)| (*k, Some(*v))).collect());
        Ok(())
    }

    fn remove_items(&self, origin: TabId, keys: &[&str]) -> Result<()> {
        self.commit(origin, keys.iter().map(|k| (*k, None)).collect());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.bus.subscribe()
    }
}
