//! Startup helpers that tie the runner to the host-owned live document key.
//!
//! The live key is written only after a run reports success. A failed run
//! leaves it byte-for-byte as it was; recovery goes through the backup id.

use serde_json::Value;

use crate::document::VersionedDocument;
use crate::error::EngineError;
use crate::runner::{MigrationResult, MigrationRunner};
use crate::store::KeyValueStore;

/// Version assumed for a persisted document with no usable `version` field.
pub const UNVERSIONED: &str = "0.0.0";

#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpgrade {
    /// Nothing is stored under the live key yet.
    Missing,
    /// The runner was invoked; see the result for the outcome.
    Ran(MigrationResult),
}

/// Decode a persisted document, tolerating a missing or non-string version.
///
/// Returns the document and the version it declared, if any.
///
/// # Errors
///
/// Returns [`EngineError::CorruptDocument`] if `raw` is not a JSON object.
pub fn decode_document(raw: &str) -> Result<(VersionedDocument, Option<String>), EngineError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| EngineError::CorruptDocument(err.to_string()))?;
    let Value::Object(mut map) = value else {
        return Err(EngineError::CorruptDocument(
            "expected a JSON object at the top level".to_string(),
        ));
    };

    let declared = match map.remove("version") {
        Some(Value::String(version)) => Some(version),
        Some(other) => {
            tracing::warn!(version = %other, "document version is not a string; treating as unversioned");
            None
        }
        None => None,
    };

    let doc = VersionedDocument {
        version: declared.clone().unwrap_or_else(|| UNVERSIONED.to_string()),
        fields: map.into_iter().collect(),
    };
    Ok((doc, declared))
}

/// Migrate the document stored under `key`, writing it back only on success.
///
/// # Errors
///
/// Returns an error if the live key cannot be read or decoded, if the runner
/// hits a persistence failure, or if the migrated document cannot be written.
pub fn upgrade_live_document(
    runner: &MigrationRunner,
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<LiveUpgrade, EngineError> {
    let Some(raw) = store.get(key)? else {
        return Ok(LiveUpgrade::Missing);
    };
    let (doc, declared) = decode_document(&raw)?;
    let declared = declared.unwrap_or_else(|| UNVERSIONED.to_string());

    let result = runner.run(doc, &declared)?;
    if !result.success {
        tracing::error!(
            backup_id = result.backup_id.as_deref().unwrap_or_default(),
            error = result.error.as_deref().unwrap_or_default(),
            "migration failed; live document left untouched"
        );
        return Ok(LiveUpgrade::Ran(result));
    }

    if !result.wrote_backup() {
        return Ok(LiveUpgrade::Ran(result));
    }
    if let Some(data) = &result.data {
        let serialized = data.to_json().map_err(|source| EngineError::Serialize {
            what: "live document",
            source,
        })?;
        store.set(key, &serialized)?;
        tracing::info!(key, version = %data.version, "live document updated");
    }
    Ok(LiveUpgrade::Ran(result))
}

/// Overwrite the live document with the snapshot of backup `id`.
///
/// Returns the restored document, or `None` if the backup does not exist
/// (in which case the live key is not touched).
///
/// # Errors
///
/// Returns an error if the backup cannot be read or the live key written.
pub fn restore_live_document(
    runner: &MigrationRunner,
    store: &dyn KeyValueStore,
    key: &str,
    id: &str,
) -> Result<Option<VersionedDocument>, EngineError> {
    let Some(snapshot) = runner.restore_backup(id)? else {
        return Ok(None);
    };
    let serialized = snapshot.to_json().map_err(|source| EngineError::Serialize {
        what: "live document",
        source,
    })?;
    store.set(key, &serialized)?;
    runner
        .log()
        .info(format!("Restored backup {id} (version {}) to {key}", snapshot.version))?;
    Ok(Some(snapshot))
}
