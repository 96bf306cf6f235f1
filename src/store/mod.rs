//! Persistent key-value storage for session credentials.
//!
//! The store is shared by every session context on the machine. Writes are
//! last-writer-wins with no locking across contexts, so readers re-validate
//! what they load instead of trusting a cached copy.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Storage location unavailable: {0}")]
    Location(String),
}

/// Durable string storage keyed by name.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// The named slots the session manager reads and writes. Nothing else in the
/// crate touches the store directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Credential + user record used for outgoing requests.
    CurrentSession,
    /// Operator credential + user parked while a delegate session is current.
    OperatorSession,
    /// "true" while an impersonation session is open.
    ImpersonationFlag,
}

impl Slot {
    pub const ALL: [Slot; 3] = [
        Slot::CurrentSession,
        Slot::OperatorSession,
        Slot::ImpersonationFlag,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Slot::CurrentSession => "session.current",
            Slot::OperatorSession => "session.operator",
            Slot::ImpersonationFlag => "session.impersonating",
        }
    }
}

/// In-process store. Clones share the same map, which is how tests model two
/// contexts looking at one storage area.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// A single JSON document on disk. Every call re-reads the file so changes
/// made by another process are picked up immediately.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `session.json` inside the CLI state directory.
    pub fn in_state_dir() -> Result<Self, StoreError> {
        Ok(Self::new(state_dir()?.join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        // Readers must never observe a truncated document
        let content = serde_json::to_string_pretty(entries)?;
        let temp_path = self.temp_path();
        fs::write(&temp_path, content)?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Sibling of the document, unique per process.
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session.json".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// `$BACKOFFICE_CONFIG_DIR`, or `~/.config/backoffice/cli`. Created on demand.
pub fn state_dir() -> Result<PathBuf, StoreError> {
    let dir = if let Ok(custom_dir) = std::env::var("BACKOFFICE_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME")
            .map_err(|_| StoreError::Location("HOME environment variable not set".to_string()))?;
        PathBuf::from(home).join(".config").join("backoffice").join("cli")
    };

    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_clones_share_entries() {
        let a = MemoryStore::new();
        let b = a.clone();
        a.set("k", "v").unwrap();
        assert_eq!(b.get("k").unwrap().as_deref(), Some("v"));
        b.remove("k").unwrap();
        assert!(a.is_empty());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let first = FileStore::new(&path);
        first.set(Slot::ImpersonationFlag.key(), "true").unwrap();

        let second = FileStore::new(&path);
        assert_eq!(
            second.get(Slot::ImpersonationFlag.key()).unwrap().as_deref(),
            Some("true")
        );

        second.remove(Slot::ImpersonationFlag.key()).unwrap();
        assert_eq!(first.get(Slot::ImpersonationFlag.key()).unwrap(), None);
    }

    #[test]
    fn file_store_replaces_document_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStore::new(&path);

        store.set(Slot::CurrentSession.key(), "a").unwrap();
        store.set(Slot::OperatorSession.key(), "b").unwrap();
        store.remove(Slot::CurrentSession.key()).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("session.json")]);

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk.get(Slot::OperatorSession.key()).map(String::as_str), Some("b"));
    }

    #[test]
    fn file_store_reports_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "<html>not json</html>").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("anything"), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn slot_keys_are_distinct() {
        let mut keys: Vec<_> = Slot::ALL.iter().map(|s| s.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), Slot::ALL.len());
    }
}
