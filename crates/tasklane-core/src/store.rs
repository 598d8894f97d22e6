//! Persisted key-value store the engine writes backups and logs through.
//!
//! Values are opaque serialized text. The engine parses and produces them
//! itself; a store only has to round-trip strings without loss.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::StoreError;

/// Key holding the serialized backup set.
pub const BACKUPS_KEY: &str = "migration-backups";
/// Key holding the serialized migration log.
pub const LOG_KEY: &str = "migration-log";
/// Key holding the live application document. Owned by the host.
pub const DOCUMENT_KEY: &str = "app-state";

/// Synchronous get/set storage.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value could not be durably written.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process store, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key.
///
/// Writes go to a sibling temp file that is fsynced and renamed over the
/// target, so a crash mid-write leaves either the old or the new value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path backing `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn write_atomic(&self, key: &str, value: &str) -> io::Result<()> {
        let target = self.path_for(key);
        let tmp = self.root.join(format!(".{key}.json.tmp"));

        let mut file = fs::File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &target)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write_atomic(key, value).map_err(|source| {
            tracing::error!(key, error = %source, "store write failed");
            StoreError::Write {
                key: key.to_string(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{FileStore, KeyValueStore, MemoryStore};
    use tempfile::TempDir;

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").expect("get"), None);
        store.set("k", "v1").expect("set");
        store.set("k", "v2").expect("set");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("v2"));
    }

    #[test]
    fn file_store_missing_key_is_none() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::open(dir.path().join("store")).expect("open");
        assert_eq!(store.get("absent").expect("get"), None);
    }

    #[test]
    fn file_store_overwrites_without_leaving_temp_files() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::open(dir.path()).expect("open");
        store.set("app-state", r#"{"version":"1.0.0"}"#).expect("set");
        store.set("app-state", r#"{"version":"1.1.0"}"#).expect("set");

        assert_eq!(
            store.get("app-state").expect("get").as_deref(),
            Some(r#"{"version":"1.1.0"}"#)
        );
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["app-state.json"]);
    }

    #[test]
    fn file_store_write_into_missing_dir_fails() {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::open(dir.path().join("gone")).expect("open");
        std::fs::remove_dir_all(store.root()).expect("remove");
        assert!(store.set("k", "v").is_err());
    }
}
