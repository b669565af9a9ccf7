//! Client-side preference storage for the visited flag and install-offer
//! stamps.

use hashbrown::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::warn;

/// String key/value store persisted client-side. Writes are best-effort;
/// a failing backend never surfaces to the caller.
pub trait PrefStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, overwriting any previous one.
    fn put(&self, key: &str, value: &str);

    /// Remove a value.
    fn remove(&self, key: &str);
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryPrefs {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryPrefs {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrefStore for MemoryPrefs {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

/// JSON-file-backed store. Loads eagerly, writes through on every put.
#[derive(Debug)]
pub struct FilePrefs {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FilePrefs {
    /// Open a store at the given path. A missing or unreadable file
    /// starts empty.
    pub fn open(path: PathBuf) -> Self {
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    fn flush(&self, entries: &HashMap<String, String>) {
        match serde_json::to_string_pretty(entries) {
            Ok(raw) => {
                if let Err(err) = std::fs::write(&self.path, raw) {
                    warn!(path = %self.path.display(), error = %err, "Preference write failed");
                }
            }
            Err(err) => {
                warn!(error = %err, "Preference serialization failed");
            }
        }
    }
}

impl PrefStore for FilePrefs {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.to_string(), value.to_string());
            self.flush(&entries);
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
            self.flush(&entries);
        }
    }
}
