//! Uniform key-value storage.
//!
//! `MemoryStore` keeps everything in process; `JsonFileStore` persists a single
//! JSON object on disk. Both follow last-write-wins semantics.

use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored value for '{key}' is not valid: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>>;

    /// Overwrites any existing value.
    fn set(&self, key: &str, value: serde_json::Value) -> StoreResult<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// All keys, sorted.
    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// Typed access on top of any store.
pub trait StoreExt: KeyValueStore {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Decode {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.set(key, value)
    }

    fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {}

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// A single JSON document on disk, cached in memory and rewritten on every change.
///
/// The cache only changes once the new document is on disk.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`. A missing file reads as empty.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    // Keep the damaged file around instead of silently overwriting it
                    let backup = path.with_extension("json.corrupt");
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "store file unreadable, starting empty"
                    );
                    fs::rename(&path, &backup).map_err(|source| StoreError::Io {
                        path: backup.clone(),
                        source,
                    })?;
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), keys = entries.len(), "opened store");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, serde_json::Value>) -> StoreResult<()> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| StoreError::Io { path, source }
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let text = serde_json::to_string_pretty(entries).map_err(|source| StoreError::Encode {
            key: "*".to_string(),
            source,
        })?;
        // Write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> StoreResult<Option<serde_json::Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: serde_json::Value) -> StoreResult<()> {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// Per-user data directory, e.g. `~/.local/share/npc-helper` on Linux.
pub fn default_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "npc-helper", "npc-helper").map(|d| d.data_dir().to_path_buf())
}

pub fn default_store_path() -> Option<PathBuf> {
    default_data_dir().map(|d| d.join("store.json"))
}
