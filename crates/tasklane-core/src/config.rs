use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backup::MAX_BACKUPS;
use crate::log::DEFAULT_LOG_CAPACITY;

/// Directory holding config, store, and lock file.
pub const TASKLANE_DIR: &str = ".tasklane";
/// Config file name inside [`TASKLANE_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backups: BackupConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_max_backups")]
    pub max: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            max: default_max_backups(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store directory, relative to the `.tasklane` directory unless absolute.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock.timeout_ms)
    }

    /// Absolute store directory for a project rooted at `project_root`.
    #[must_use]
    pub fn store_dir(&self, project_root: &Path) -> PathBuf {
        if self.store.dir.is_absolute() {
            self.store.dir.clone()
        } else {
            project_root.join(TASKLANE_DIR).join(&self.store.dir)
        }
    }

    /// Serialize as TOML, for writing a starter config file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[must_use]
pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(TASKLANE_DIR).join(CONFIG_FILE)
}

/// Load `.tasklane/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_engine_config(project_root: &Path) -> Result<EngineConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EngineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_max_backups() -> usize {
    MAX_BACKUPS
}

const fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

const fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("store")
}
