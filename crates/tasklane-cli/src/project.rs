//! Locating a tasklane project and wiring the engine to its on-disk store.

use anyhow::{Context as _, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tasklane_core::config::{EngineConfig, TASKLANE_DIR, load_engine_config};
use tasklane_core::error::ErrorCode;
use tasklane_core::lock::{RUN_LOCK_FILE, RunLock};
use tasklane_core::store::{FileStore, KeyValueStore};
use tasklane_core::{EngineError, MigrationRegistry, MigrationRunner};

/// Raised when no `.tasklane/` directory exists at or above the start dir.
#[derive(Debug)]
pub struct NotInitialized {
    pub start: PathBuf,
}

impl fmt::Display for NotInitialized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: no {TASKLANE_DIR}/ directory found at or above {}",
            ErrorCode::NotInitialized.code(),
            self.start.display()
        )
    }
}

impl std::error::Error for NotInitialized {}

/// `.tasklane/config.toml` exists but cannot be read or parsed.
#[derive(Debug)]
pub struct ConfigInvalid(pub anyhow::Error);

impl fmt::Display for ConfigInvalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", ErrorCode::ConfigParseError.code(), self.0)
    }
}

impl std::error::Error for ConfigInvalid {}

/// Walk up from `start` until a directory containing `.tasklane/` is found.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(TASKLANE_DIR).is_dir() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// An opened project: config, store, and a runner over the builtin registry.
pub struct Project {
    pub root: PathBuf,
    pub config: EngineConfig,
    pub store: Arc<FileStore>,
    pub runner: MigrationRunner,
}

impl Project {
    /// Open the project enclosing `start`.
    ///
    /// # Errors
    ///
    /// Returns [`NotInitialized`] if no project is found, or an error if the
    /// config cannot be parsed or the store directory cannot be opened.
    pub fn open(start: &Path) -> Result<Self> {
        let root = find_project_root(start).ok_or_else(|| NotInitialized {
            start: start.to_path_buf(),
        })?;
        let config = load_engine_config(&root).map_err(ConfigInvalid)?;
        let store_dir = config.store_dir(&root);
        let store = Arc::new(
            FileStore::open(&store_dir)
                .with_context(|| format!("Failed to open store at {}", store_dir.display()))?,
        );
        let registry = MigrationRegistry::builtin().map_err(EngineError::from)?;
        let shared: Arc<dyn KeyValueStore> = store.clone();
        let runner = MigrationRunner::with_config(registry, shared, &config);

        tracing::debug!(root = %root.display(), store = %store_dir.display(), "project opened");
        Ok(Self {
            root,
            config,
            store,
            runner,
        })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(TASKLANE_DIR).join(RUN_LOCK_FILE)
    }

    /// Take the run lock for a command that writes to the store.
    ///
    /// # Errors
    ///
    /// Returns the lock error if another process holds the lock past the
    /// configured timeout.
    pub fn lock(&self) -> Result<RunLock> {
        Ok(RunLock::acquire(
            &self.lock_path(),
            self.config.lock_timeout(),
        )?)
    }
}
