//! Key-value persistence backends.
//!
//! Values are JSON text. Backends report failures as [`PersistenceError`];
//! the stores built on top decide whether a failure degrades or surfaces.
//!
//! Writes to [`FileStore`] use a temp file plus rename so a crash mid-write
//! never leaves a half-written entry behind.

use crate::error::PersistenceError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub type StorageResult<T> = Result<T, PersistenceError>;

pub trait KeyValueStore: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

fn check_quota(quota: Option<usize>, needed: usize) -> StorageResult<()> {
    match quota {
        Some(quota) if needed > quota => Err(PersistenceError::QuotaExceeded { needed, quota }),
        _ => Ok(()),
    }
}

/// In-memory backend, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the total bytes (keys plus values) the store may hold.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.entries();
        let others: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum();
        check_quota(self.quota, others + key.len() + value.len())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a state directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    quota: Option<usize>,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            quota: None,
        }
    }

    /// Limit the total bytes of all entry files.
    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Keys are restricted to `[A-Za-z0-9._-]` so that
    /// distinct keys always map to distinct files inside `dir`.
    pub fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(PersistenceError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut tmp = path.to_path_buf();
        tmp.set_extension("json.tmp");
        tmp
    }

    fn bytes_used_except(&self, exclude: &Path) -> StorageResult<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut total = 0usize;
        for entry in entries {
            let path = entry?.path();
            if path == exclude || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            total += fs::metadata(&path)?.len() as usize;
        }
        Ok(total)
    }
}

impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        if self.quota.is_some() {
            let needed = self.bytes_used_except(&path)? + value.len();
            check_quota(self.quota, needed)?;
        }

        fs::create_dir_all(&self.dir)?;
        let tmp_path = Self::temp_path(&path);
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;
        tracing::debug!(key, path = %path.display(), bytes = value.len(), "persisted entry");
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read a JSON array stored under `key`. A missing key is an empty list.
pub fn load_list<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> StorageResult<Vec<T>> {
    match store.get(key)? {
        None => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(&raw).map_err(|e| PersistenceError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

pub fn store_list<T: Serialize>(store: &dyn KeyValueStore, key: &str, items: &[T]) -> StorageResult<()> {
    let raw = serde_json::to_string(items)?;
    store.set(key, &raw)
}
