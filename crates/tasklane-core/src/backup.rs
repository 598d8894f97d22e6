//! Bounded set of point-in-time document snapshots.
//!
//! A backup is captured before any migration mutates the document. The set
//! is persisted as one JSON value under [`BACKUPS_KEY`] and holds at most
//! `max_backups` records; on overflow the oldest record by
//! `(timestamp, generation)` is evicted, so equal timestamps fall back to
//! insertion order.
//!
//! Snapshots are never handed out by reference. Every [`BackupStore::restore`]
//! deserializes a fresh copy and re-verifies its blake3 checksum.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::VersionedDocument;
use crate::error::EngineError;
use crate::log::MigrationLog;
use crate::store::{BACKUPS_KEY, KeyValueStore};

/// Default retention bound.
pub const MAX_BACKUPS: usize = 3;

/// Source of wall-clock timestamps for new backups.
pub type Clock = fn() -> DateTime<Utc>;

/// A stored snapshot. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub id: String,
    pub generation: u64,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u64,
    pub checksum: String,
    pub snapshot: VersionedDocument,
}

impl BackupRecord {
    fn sort_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.generation)
    }
}

/// Backup metadata without the snapshot payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub id: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub size_bytes: u64,
    pub checksum: String,
}

impl From<&BackupRecord> for BackupSummary {
    fn from(record: &BackupRecord) -> Self {
        Self {
            id: record.id.clone(),
            version: record.version.clone(),
            timestamp: record.timestamp,
            size_bytes: record.size_bytes,
            checksum: record.checksum.clone(),
        }
    }
}

/// Persisted envelope. `next_generation` survives deletes so ids are never
/// reused.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackupSet {
    next_generation: u64,
    backups: Vec<BackupRecord>,
}

pub struct BackupStore {
    store: Arc<dyn KeyValueStore>,
    log: MigrationLog,
    max_backups: usize,
    clock: Clock,
}

impl BackupStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, log: MigrationLog) -> Self {
        Self {
            store,
            log,
            max_backups: MAX_BACKUPS,
            clock: Utc::now,
        }
    }

    /// Override the retention bound. Values below one are clamped to one.
    #[must_use]
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups.max(1);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Snapshot `doc`, prune to the retention bound, and persist the set.
    ///
    /// Returns the id of the new backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing set is unreadable or the updated set
    /// cannot be persisted. No backup exists in that case.
    pub fn create(&self, doc: &VersionedDocument) -> Result<String, EngineError> {
        let mut set = self.load()?;

        let snapshot = doc.clone();
        let serialized = snapshot.to_json().map_err(|source| EngineError::Serialize {
            what: "backup snapshot",
            source,
        })?;
        let checksum = checksum_of(&serialized);

        let generation = set.next_generation.max(1);
        set.next_generation = generation + 1;
        let id = format!("bk-{generation:06}-{}", short_digest(&checksum));

        set.backups.push(BackupRecord {
            id: id.clone(),
            generation,
            version: doc.version.clone(),
            timestamp: (self.clock)(),
            size_bytes: serialized.len() as u64,
            checksum,
            snapshot,
        });
        let evicted = prune(&mut set.backups, self.max_backups);

        self.persist(&set)?;
        for old in &evicted {
            tracing::debug!(backup_id = %old.id, "evicted backup beyond retention bound");
        }
        self.log.info(format!(
            "Created backup {id} of version {} ({} bytes)",
            doc.version,
            serialized.len()
        ))?;
        Ok(id)
    }

    /// Fresh copy of the snapshot stored under `id`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the set is unreadable or the snapshot no longer
    /// matches its checksum.
    pub fn restore(&self, id: &str) -> Result<Option<VersionedDocument>, EngineError> {
        let set = self.load()?;
        let Some(record) = set.backups.into_iter().find(|r| r.id == id) else {
            tracing::debug!(backup_id = id, "backup not found");
            return Ok(None);
        };

        let serialized = record.snapshot.to_json().map_err(|source| EngineError::Serialize {
            what: "backup snapshot",
            source,
        })?;
        if checksum_of(&serialized) != record.checksum {
            return Err(EngineError::ChecksumMismatch { id: record.id });
        }
        Ok(Some(record.snapshot))
    }

    /// Backup metadata, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be read.
    pub fn list(&self) -> Result<Vec<BackupSummary>, EngineError> {
        let mut backups = self.load()?.backups;
        backups.sort_by_key(|r| std::cmp::Reverse(r.sort_key()));
        Ok(backups.iter().map(BackupSummary::from).collect())
    }

    /// Remove the backup `id`. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be read or persisted.
    pub fn delete(&self, id: &str) -> Result<bool, EngineError> {
        let mut set = self.load()?;
        let before = set.backups.len();
        set.backups.retain(|r| r.id != id);
        if set.backups.len() == before {
            return Ok(false);
        }

        self.persist(&set)?;
        self.log.info(format!("Deleted backup {id}"))?;
        Ok(true)
    }

    fn load(&self) -> Result<BackupSet, EngineError> {
        let Some(raw) = self.store.get(BACKUPS_KEY)? else {
            return Ok(BackupSet::default());
        };
        serde_json::from_str(&raw).map_err(|err| {
            tracing::error!(error = %err, "backup set failed to parse");
            EngineError::CorruptBackupSet(err.to_string())
        })
    }

    fn persist(&self, set: &BackupSet) -> Result<(), EngineError> {
        let raw = serde_json::to_string(set).map_err(|source| EngineError::Serialize {
            what: "backup set",
            source,
        })?;
        self.store.set(BACKUPS_KEY, &raw)?;
        Ok(())
    }
}

/// Evict oldest records until at most `max` remain. Returns the evicted ones.
fn prune(backups: &mut Vec<BackupRecord>, max: usize) -> Vec<BackupRecord> {
    let mut evicted = Vec::new();
    while backups.len() > max {
        let Some(oldest) = backups
            .iter()
            .enumerate()
            .min_by_key(|(_, r)| r.sort_key())
            .map(|(idx, _)| idx)
        else {
            break;
        };
        evicted.push(backups.remove(oldest));
    }
    evicted
}

fn checksum_of(serialized: &str) -> String {
    format!("blake3:{}", blake3::hash(serialized.as_bytes()).to_hex())
}

fn short_digest(checksum: &str) -> &str {
    let hex = checksum.strip_prefix("blake3:").unwrap_or(checksum);
    hex.get(..8).unwrap_or(hex)
}
