//! File-backed storage area shared between processes

use super::{apply_changes, diff, StorageArea, StorageBus, StorageEvent, TabId};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Storage area persisted as a JSON object on disk.
///
/// Every write replaces the file through a rename, so readers in other
/// processes never see a half-written file. Writes made by other processes
/// are picked up by [`FileStorage::poll_changes`].
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    /// Last contents this handle observed on disk
    snapshot: Mutex<HashMap<String, String>>,
    bus: StorageBus,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let snapshot = read_items(&path)?;
        debug!(path = %path.display(), keys = snapshot.len(), "Opened file storage");

        Ok(Self {
            path,
            snapshot: Mutex::new(snapshot),
            bus: StorageBus::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publish events for changes other processes made since the last look.
    /// Returns the number of changed keys.
    pub fn poll_changes(&self) -> Result<usize> {
        let mut snapshot = self.snapshot.lock();
        Ok(self.sync_snapshot(&mut snapshot)?.len())
    }

    /// Poll the file on a fixed interval until the task is aborted
    pub fn spawn_poller(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.poll_changes() {
                    Ok(0) => {}
                    Ok(changed) => debug!(changed, "Picked up external storage changes"),
                    Err(e) => warn!(error = %e, "Failed to poll storage file"),
                }
            }
        })
    }

    fn sync_snapshot(&self, snapshot: &mut HashMap<String, String>) -> Result<Vec<StorageEvent>> {
        let on_disk = read_items(&self.path)?;
        let events = diff(snapshot, &on_disk, TabId::EXTERNAL);
        for event in &events {
            self.bus.publish(event.clone());
        }
        *snapshot = on_disk;
        Ok(events)
    }

    fn commit(&self, origin: TabId, changes: Vec<(&str, Option<&str>)>) -> Result<()> {
        let mut snapshot = self.snapshot.lock();
        // Surface foreign writes first so they are not silently folded into ours
        self.sync_snapshot(&mut snapshot)?;

        let mut items = snapshot.clone();
        let events = apply_changes(&mut items, origin, changes);
        if events.is_empty() {
            return Ok(());
        }

        write_items(&self.path, &items)?;
        *snapshot = items;
        for event in events {
            self.bus.publish(event);
        }
        Ok(())
    }
}

impl StorageArea for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(read_items(&self.path)?.remove(key))
    }

    fn set_items(&self, origin: TabId, items: &[(&str, &str)]) -> Result<()> {
        self.commit(origin, items.iter().map(|(k, v)| (*k, Some(*v))).collect())
    }

    fn remove_items(&self, origin: TabId, keys: &[&str]) -> Result<()> {
        self.commit(origin, keys.iter().map(|k| (*k, None)).collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.bus.subscribe()
    }
}

fn read_items(path: &Path) -> Result<HashMap<String, String>> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
        Ok(content) => serde_json::from_str(&content).map_err(|e| {
            Error::Storage(format!("{} is not a valid storage file: {}", path.display(), e))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_items(path: &Path, items: &HashMap<String, String>) -> Result<()> {
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    let content = serde_json::to_string_pretty(items)?;
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::Io(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let tab = TabId::new();

        let storage = FileStorage::open(&path).unwrap();
        storage.set_items(tab, &[("accessToken", "a"), ("refreshToken", "r")]).unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get("accessToken").unwrap().as_deref(), Some("a"));
        assert_eq!(reopened.get("refreshToken").unwrap().as_deref(), Some("r"));
    }

    #[test]
    fn test_poll_sees_other_handle_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let ours = FileStorage::open(&path).unwrap();
        let theirs = FileStorage::open(&path).unwrap();
        let mut rx = ours.subscribe();

        theirs.set(TabId::new(), "accessToken", "t1").unwrap();
        assert!(rx.try_recv().is_err());

        assert_eq!(ours.poll_changes().unwrap(), 1);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.key, "accessToken");
        assert_eq!(event.new_value.as_deref(), Some("t1"));
        assert_eq!(event.origin, TabId::EXTERNAL);

        assert_eq!(ours.poll_changes().unwrap(), 0);
    }

    #[test]
    fn test_write_keeps_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let ours = FileStorage::open(&path).unwrap();
        let theirs = FileStorage::open(&path).unwrap();

        theirs.set(TabId::new(), "other", "x").unwrap();
        ours.set(TabId::new(), "mine", "y").unwrap();

        assert_eq!(theirs.get("other").unwrap().as_deref(), Some("x"));
        assert_eq!(theirs.get("mine").unwrap().as_deref(), Some("y"));
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(FileStorage::open(&path), Err(Error::Storage(_))));
    }
}
