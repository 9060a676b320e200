//! Local key-value storage for persisted progress.
//!
//! Progress is stored as a single JSON document under a fixed key. Two
//! stores are provided: [`MemoryStore`] for tests and throwaway sessions,
//! and [`JsonFileStore`], which keeps one `<key>.json` file per key.
//!
//! There is exactly one writer per store, so writes are last-write-wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::is_valid_storage_key;
use crate::error::{CourseError, Result};

/// A minimal string key-value store.
pub trait KeyValueStore: Send {
    /// Returns the value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;
}

// ============================================================================
// Memory Store
// ============================================================================

/// In-memory store backed by a `HashMap`.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with one entry.
    #[must_use]
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(key.into(), value.into());
        Self { entries }
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// JSON File Store
// ============================================================================

/// File-backed store writing one `<key>.json` file per key.
///
/// Writes go to a temporary sibling file that is then renamed over the
/// target, so a crash mid-write never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the root directory of this store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path used for `key`.
    ///
    /// # Errors
    ///
    /// Returns `CourseError::StorageError` if the key contains characters
    /// that could escape the store directory.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_storage_key(key) {
            return Err(CourseError::storage(key, "invalid key"));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CourseError::storage(key, e.to_string())),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| CourseError::storage(key, e.to_string()))?;

        let tmp_path = self.dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp_path, value).map_err(|e| CourseError::storage(key, e.to_string()))?;
        std::fs::rename(&tmp_path, &path).map_err(|e| CourseError::storage(key, e.to_string()))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CourseError::storage(key, e.to_string())),
        }
    }
}
