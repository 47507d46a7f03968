//! Key-value backends
//!
//! The engine persists through a minimal get/set/remove store. On disk each
//! key is one file, `{dir}/{key}.json`, guarded by an advisory lock file
//! so that concurrent processes never read a half-written value.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid storage key: '{0}'")]
    InvalidKey(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Storage rejected the write: {0}")]
    Rejected(String),
}

/// A synchronous string key-value store
pub trait KeyValueStore {
    /// Returns the stored value, or None if the key is absent
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores a value, replacing any previous one
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes a key; removing an absent key succeeds
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// File-per-key store in a directory
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Creates a store rooted at `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the file that holds `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{}.lock", key))
    }

    fn open_lock(&self, key: &str) -> Result<File, StoreError> {
        let path = self.lock_path(key);
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_error(&path))
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let lock = self.open_lock(key)?;
        lock.lock_shared().map_err(|source| StoreError::Lock {
            path: self.lock_path(key),
            source,
        })?;

        let mut content = String::new();
        File::open(&path)
            .and_then(|mut file| file.read_to_string(&mut content))
            .map_err(io_error(&path))?;

        // Lock is released when the lock file is dropped
        Ok(Some(content))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let lock = self.open_lock(key)?;
        lock.lock_exclusive().map_err(|source| StoreError::Lock {
            path: self.lock_path(key),
            source,
        })?;

        let path = self.path_for(key);
        let temp_path = path.with_extension("json.tmp");

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(io_error(&temp_path))?;
            file.write_all(value.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(io_error(&temp_path))?;
        }

        // Atomic rename
        fs::rename(&temp_path, &path).map_err(io_error(&path))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(());
        }

        let lock = self.open_lock(key)?;
        lock.lock_exclusive().map_err(|source| StoreError::Lock {
            path: self.lock_path(key),
            source,
        })?;
        fs::remove_file(&path).map_err(io_error(&path))
    }
}

/// In-process store, used by tests and embedders without a filesystem
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    values: HashMap<String, String>,
    fail_writes: bool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set` fail, simulating a full or broken store
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Stores a raw value, bypassing the failure switch
    pub fn insert_raw(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        if self.fail_writes {
            return Err(StoreError::Rejected("quota exceeded".to_string()));
        }
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_missing_key() {
        let dir = TempDir::new().unwrap();
        let store = FileKvStore::new(dir.path());

        assert!(store.get("todo_app_data").unwrap().is_none());
    }

    #[test]
    fn write_and_read_value() {
        let dir = TempDir::new().unwrap();
        let mut store = FileKvStore::new(dir.path());

        store.set("todo_app_data", r#"{"tasks":[]}"#).unwrap();

        assert_eq!(
            store.get("todo_app_data").unwrap().as_deref(),
            Some(r#"{"tasks":[]}"#)
        );
        assert!(store.path_for("todo_app_data").is_file());
    }

    #[test]
    fn overwrite_replaces_value() {
        let dir = TempDir::new().unwrap();
        let mut store = FileKvStore::new(dir.path());

        store.set("k", "first").unwrap();
        store.set("k", "second").unwrap();

        assert_eq!(store.get("k").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let mut store = FileKvStore::new(dir.path().join("nested").join("dir"));

        store.set("k", "v").unwrap();

        assert!(store.path_for("k").exists());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let mut store = FileKvStore::new(dir.path());

        store.set("k", "v").unwrap();

        let temp_path = store.path_for("k").with_extension("json.tmp");
        assert!(!temp_path.exists());
    }

    #[test]
    fn remove_key() {
        let dir = TempDir::new().unwrap();
        let mut store = FileKvStore::new(dir.path());

        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());

        // Removing again is fine
        store.remove("k").unwrap();
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = TempDir::new().unwrap();
        let mut store = FileKvStore::new(dir.path());

        assert!(matches!(
            store.set("../escape", "v"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(store.get(""), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn memory_store_roundtrip() {
        let mut store = MemoryKvStore::new();

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.remove("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn memory_store_can_fail_writes() {
        let mut store = MemoryKvStore::new();
        store.set("k", "old").unwrap();
        store.set_fail_writes(true);

        assert!(matches!(store.set("k", "new"), Err(StoreError::Rejected(_))));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("old"));
    }
}
