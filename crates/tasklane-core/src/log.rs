//! Append-only, length-capped diagnostic trail of migration activity.
//!
//! The log exists for postmortems. It is persisted under [`LOG_KEY`]
//! independently of the backup set, and every entry is mirrored to
//! `tracing` as it is appended.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::store::{KeyValueStore, LOG_KEY};

/// Default number of entries retained.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
}

/// Handle to the persisted migration log. Cheap to clone.
#[derive(Clone)]
pub struct MigrationLog {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
}

impl MigrationLog {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_capacity(store, DEFAULT_LOG_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, dropping the oldest entries beyond capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or persisted.
    pub fn append(&self, message: impl Into<String>, level: LogLevel) -> Result<(), EngineError> {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!(target: "tasklane::migration", "{message}"),
            LogLevel::Error => tracing::error!(target: "tasklane::migration", "{message}"),
        }

        let mut entries = self.read_all()?;
        entries.push(LogEntry {
            timestamp: Utc::now(),
            message,
            level,
        });
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }
        self.persist(&entries)
    }

    /// Shorthand for an info-level append.
    ///
    /// # Errors
    ///
    /// See [`MigrationLog::append`].
    pub fn info(&self, message: impl Into<String>) -> Result<(), EngineError> {
        self.append(message, LogLevel::Info)
    }

    /// Shorthand for an error-level append.
    ///
    /// # Errors
    ///
    /// See [`MigrationLog::append`].
    pub fn error(&self, message: impl Into<String>) -> Result<(), EngineError> {
        self.append(message, LogLevel::Error)
    }

    /// All retained entries, oldest first.
    ///
    /// An unparsable persisted log reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself fails.
    pub fn read_all(&self) -> Result<Vec<LogEntry>, EngineError> {
        let Some(raw) = self.store.get(LOG_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                tracing::warn!(error = %err, "migration log is unreadable; starting fresh");
                Ok(Vec::new())
            }
        }
    }

    /// Remove every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the empty log cannot be persisted.
    pub fn clear(&self) -> Result<(), EngineError> {
        self.persist(&[])
    }

    fn persist(&self, entries: &[LogEntry]) -> Result<(), EngineError> {
        let raw = serde_json::to_string(entries).map_err(|source| EngineError::Serialize {
            what: "migration log",
            source,
        })?;
        self.store.set(LOG_KEY, &raw)?;
        Ok(())
    }
}
