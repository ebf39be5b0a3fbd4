//! Persistent, non-secure key/value store.
//!
//! Backs the session blob, the onboarding flag, and the biometric-enabled
//! flag. Values are opaque strings; callers own serialization.

use crate::{StorageError, StorageResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Trait for durable key/value storage surviving app restarts.
pub trait KeyValueStore: Send + Sync {
    /// Store a value under a key.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Remove a value. Returns true if the key existed.
    fn remove(&self, key: &str) -> StorageResult<bool>;
}

/// File-backed key/value store persisting a JSON map.
///
/// Every mutation rewrites the file through a temp-file rename so a crash
/// mid-write never leaves a truncated map on disk.
pub struct FileKvStore {
    path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileKvStore {
    /// Open (or create) the store at the given path.
    ///
    /// An unreadable or corrupt file is treated as empty: local storage
    /// failures fail open toward "no data" rather than blocking startup.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, String>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "KV store file corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "KV store file unreadable, starting empty");
                HashMap::new()
            }
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    fn persist(&self, data: &HashMap<String, String>) -> StorageResult<()> {
        let content = serde_json::to_string_pretty(data)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// The file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileKvStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap();
        data.insert(key.to_string(), value.to_string());
        self.persist(&data)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.lock().unwrap();
        Ok(data.get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock().unwrap();
        let existed = data.remove(key).is_some();
        if existed {
            self.persist(&data)?;
        }
        Ok(existed)
    }
}

/// In-memory key/value store for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemoryKvStore {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().unwrap().remove(key).is_some())
    }
}
