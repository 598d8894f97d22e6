//! Migration orchestration.
//!
//! A run moves through a small fixed sequence:
//!
//! ```text
//! START ── already current ──────────────────────────────▶ DONE (no-op)
//!   │
//!   └─▶ BACKUP ─▶ APPLY_STEP* ─┬─ all steps applied ─────▶ DONE (success)
//!                              └─ a step returns Err ────▶ DONE (failure)
//! ```
//!
//! There is no retry state and no automatic rollback. A failed run returns
//! the id of the backup captured before the first step; the caller decides
//! whether to retry, restore, or halt.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backup::{BackupStore, BackupSummary};
use crate::config::EngineConfig;
use crate::document::VersionedDocument;
use crate::error::EngineError;
use crate::log::MigrationLog;
use crate::registry::MigrationRegistry;
use crate::store::KeyValueStore;
use crate::version;

/// Outcome of one [`MigrationRunner::run`] invocation.
///
/// On failure `data` is always `None`: a half-migrated document is never
/// handed back, so it can never be persisted by accident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub success: bool,
    pub migrated_from: String,
    pub migrated_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<VersionedDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
}

impl MigrationResult {
    fn unchanged(version: &str, doc: VersionedDocument) -> Self {
        Self {
            success: true,
            migrated_from: version.to_string(),
            migrated_to: version.to_string(),
            data: Some(doc),
            error: None,
            backup_id: None,
        }
    }

    fn migrated(from: &str, doc: VersionedDocument, backup_id: String) -> Self {
        Self {
            success: true,
            migrated_from: from.to_string(),
            migrated_to: doc.version.clone(),
            data: Some(doc),
            error: None,
            backup_id: Some(backup_id),
        }
    }

    fn failed(from: &str, last_applied: String, error: String, backup_id: String) -> Self {
        Self {
            success: false,
            migrated_from: from.to_string(),
            migrated_to: last_applied,
            data: None,
            error: Some(error),
            backup_id: Some(backup_id),
        }
    }

    /// True if the run created a backup, i.e. it was not the no-op path.
    #[must_use]
    pub const fn wrote_backup(&self) -> bool {
        self.backup_id.is_some()
    }
}

/// Applies pending migrations to a document, backing it up first.
///
/// Runs are not safe to execute concurrently against one store; hosts with
/// more than one process must hold a [`RunLock`](crate::lock::RunLock).
pub struct MigrationRunner {
    registry: MigrationRegistry,
    backups: BackupStore,
    log: MigrationLog,
}

impl MigrationRunner {
    /// Runner with default retention and log capacity.
    #[must_use]
    pub fn new(registry: MigrationRegistry, store: Arc<dyn KeyValueStore>) -> Self {
        let log = MigrationLog::new(Arc::clone(&store));
        let backups = BackupStore::new(store, log.clone());
        Self::from_parts(registry, backups, log)
    }

    /// Runner with retention and log capacity taken from `config`.
    #[must_use]
    pub fn with_config(
        registry: MigrationRegistry,
        store: Arc<dyn KeyValueStore>,
        config: &EngineConfig,
    ) -> Self {
        let log = MigrationLog::with_capacity(Arc::clone(&store), config.log.capacity);
        let backups = BackupStore::new(store, log.clone()).with_max_backups(config.backups.max);
        Self::from_parts(registry, backups, log)
    }

    #[must_use]
    pub const fn from_parts(
        registry: MigrationRegistry,
        backups: BackupStore,
        log: MigrationLog,
    ) -> Self {
        Self {
            registry,
            backups,
            log,
        }
    }

    #[must_use]
    pub const fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn log(&self) -> &MigrationLog {
        &self.log
    }

    #[must_use]
    pub fn current_version(&self) -> String {
        self.registry.current_version()
    }

    /// True if `declared` is absent or older than the current version.
    #[must_use]
    pub fn needs_migration(&self, declared: Option<&str>) -> bool {
        declared.is_none_or(|v| version::compare(v, &self.current_version()) == Ordering::Less)
    }

    /// Bring `doc` from `declared_from` up to the current version.
    ///
    /// A failing migration step is reported as `Ok` with `success == false`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the backup set or the log cannot be read
    /// or persisted. If the backup cannot be written no step is applied.
    pub fn run(
        &self,
        doc: VersionedDocument,
        declared_from: &str,
    ) -> Result<MigrationResult, EngineError> {
        let current = self.current_version();
        if version::compare(declared_from, &current) == Ordering::Equal {
            return Ok(MigrationResult::unchanged(declared_from, doc));
        }

        let span = tracing::info_span!("migration_run", from = declared_from, to = %current);
        let _guard = span.enter();

        self.log
            .info(format!("Starting migration from {declared_from} to {current}"))?;
        let backup_id = self.backups.create(&doc)?;

        let pending = self.registry.pending_from(declared_from);
        let mut working = doc;

        if pending.is_empty() {
            working.version.clone_from(&current);
            self.log.info(format!(
                "No migrations pending from {declared_from}; stamped version {current}"
            ))?;
            return Ok(MigrationResult::migrated(declared_from, working, backup_id));
        }

        let mut last_applied = declared_from.to_string();
        for step in pending {
            let target = step.target.to_string();
            match step.apply(working) {
                Ok(mut next) => {
                    if next.version != target {
                        next.version.clone_from(&target);
                    }
                    tracing::debug!(step = %target, "migration step applied");
                    self.log
                        .info(format!("Migrated to {target}: {}", step.description))?;
                    last_applied = target;
                    working = next;
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    self.log.error(format!(
                        "Migration to {target} failed: {error}; restore backup {backup_id} to recover"
                    ))?;
                    return Ok(MigrationResult::failed(
                        declared_from,
                        last_applied,
                        error,
                        backup_id,
                    ));
                }
            }
        }

        working.version.clone_from(&current);
        self.log
            .info(format!("Migration from {declared_from} to {current} complete"))?;
        Ok(MigrationResult::migrated(declared_from, working, backup_id))
    }

    /// Backup metadata, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup set cannot be read.
    pub fn list_backups(&self) -> Result<Vec<BackupSummary>, EngineError> {
        self.backups.list()
    }

    /// Fresh copy of a backup's snapshot, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the set is unreadable or the snapshot is corrupt.
    pub fn restore_backup(&self, id: &str) -> Result<Option<VersionedDocument>, EngineError> {
        self.backups.restore(id)
    }

    /// Delete a backup. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the set cannot be read or persisted.
    pub fn delete_backup(&self, id: &str) -> Result<bool, EngineError> {
        self.backups.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MigrationStep;
    use crate::store::MemoryStore;
    use crate::version::SemanticVersion;
    use anyhow::anyhow;
    use serde_json::json;

    fn add_x(mut doc: VersionedDocument) -> anyhow::Result<VersionedDocument> {
        doc.insert("x", json!(1));
        Ok(doc)
    }

    fn y_from_x(mut doc: VersionedDocument) -> anyhow::Result<VersionedDocument> {
        let x = doc
            .get("x")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| anyhow!("x missing"))?;
        doc.insert("y", json!(x + 1));
        Ok(doc)
    }

    fn explode(_: VersionedDocument) -> anyhow::Result<VersionedDocument> {
        Err(anyhow!("boom"))
    }

    fn runner(steps: Vec<MigrationStep>) -> (Arc<MemoryStore>, MigrationRunner) {
        let store = Arc::new(MemoryStore::new());
        let registry = MigrationRegistry::new(steps).expect("valid registry");
        (store.clone(), MigrationRunner::new(registry, store))
    }

    fn two_steps() -> Vec<MigrationStep> {
        vec![
            MigrationStep::new(SemanticVersion::new(1, 1, 0), "add x", add_x),
            MigrationStep::new(SemanticVersion::new(1, 2, 0), "derive y", y_from_x),
        ]
    }

    #[test]
    fn needs_migration_when_absent_or_older() {
        let (_, runner) = runner(two_steps());
        assert!(runner.needs_migration(None));
        assert!(runner.needs_migration(Some("1.1.0")));
        assert!(!runner.needs_migration(Some("1.2")));
        assert!(!runner.needs_migration(Some("2.0.0")));
    }

    #[test]
    fn current_version_is_a_no_op() {
        let (_, runner) = runner(two_steps());
        let doc = VersionedDocument::new("1.2.0").with_field("keep", json!(true));

        let result = runner.run(doc.clone(), "1.2.0").expect("run");
        assert!(result.success);
        assert_eq!(result.migrated_from, "1.2.0");
        assert_eq!(result.migrated_to, "1.2.0");
        assert_eq!(result.data, Some(doc));
        assert!(!result.wrote_backup());
        assert!(runner.list_backups().expect("list").is_empty());
        assert!(runner.log().read_all().expect("log").is_empty());
    }

    #[test]
    fn steps_apply_sequentially() {
        let (_, runner) = runner(two_steps());
        let result = runner.run(VersionedDocument::new("1.0.0"), "1.0.0").expect("run");

        assert!(result.success);
        assert_eq!(result.migrated_to, "1.2.0");
        let data = result.data.expect("data");
        assert_eq!(data.version, "1.2.0");
        assert_eq!(data.get("x"), Some(&json!(1)));
        assert_eq!(data.get("y"), Some(&json!(2)));
    }

    #[test]
    fn runner_stamps_step_versions() {
        fn check_stamp(doc: VersionedDocument) -> anyhow::Result<VersionedDocument> {
            if doc.version == "1.1.0" {
                Ok(doc)
            } else {
                Err(anyhow!("expected 1.1.0, saw {}", doc.version))
            }
        }
        let (_, runner) = runner(vec![
            MigrationStep::new(SemanticVersion::new(1, 1, 0), "no stamp", Ok),
            MigrationStep::new(SemanticVersion::new(1, 2, 0), "check", check_stamp),
        ]);
        let result = runner.run(VersionedDocument::new("1.0.0"), "1.0.0").expect("run");
        assert!(result.success, "{:?}", result.error);
    }

    #[test]
    fn failing_step_reports_last_good_version_and_no_data() {
        let (_, runner) = runner(vec![
            MigrationStep::new(SemanticVersion::new(1, 1, 0), "add x", add_x),
            MigrationStep::new(SemanticVersion::new(1, 2, 0), "explode", explode),
            MigrationStep::new(SemanticVersion::new(1, 3, 0), "derive y", y_from_x),
        ]);
        let original = VersionedDocument::new("1.0.0").with_field("tasks", json!([]));
        let result = runner.run(original.clone(), "1.0.0").expect("run");

        assert!(!result.success);
        assert_eq!(result.migrated_from, "1.0.0");
        assert_eq!(result.migrated_to, "1.1.0");
        assert_eq!(result.data, None);
        assert_eq!(result.error.as_deref(), Some("boom"));

        let backup_id = result.backup_id.expect("backup id");
        let restored = runner.restore_backup(&backup_id).expect("restore").expect("present");
        assert_eq!(restored, original);

        let log = runner.log().read_all().expect("log");
        assert!(log.iter().any(|e| e.level == crate::log::LogLevel::Error));
        assert!(!log.iter().any(|e| e.message.starts_with("Migrated to 1.3.0")));
    }

    #[test]
    fn first_step_failure_reports_declared_version() {
        let (_, runner) = runner(vec![MigrationStep::new(
            SemanticVersion::new(1, 1, 0),
            "explode",
            explode,
        )]);
        let result = runner.run(VersionedDocument::new("1.0.0"), "1.0.0").expect("run");
        assert!(!result.success);
        assert_eq!(result.migrated_to, "1.0.0");
    }

    #[test]
    fn newer_than_registry_is_stamped_with_backup() {
        let (_, runner) = runner(two_steps());
        let result = runner.run(VersionedDocument::new("9.0.0"), "9.0.0").expect("run");

        assert!(result.success);
        assert_eq!(result.migrated_to, "1.2.0");
        assert_eq!(result.data.expect("data").version, "1.2.0");
        assert!(result.backup_id.is_some());
        assert_eq!(runner.list_backups().expect("list").len(), 1);
    }

    #[test]
    fn empty_registry_stamps_baseline() {
        let (_, runner) = runner(Vec::new());
        let result = runner.run(VersionedDocument::new("0.5.0"), "0.5.0").expect("run");
        assert!(result.success);
        assert_eq!(result.migrated_to, crate::registry::BASELINE_VERSION);
        assert!(result.backup_id.is_some());
    }

    #[test]
    fn result_serializes_camel_case_without_absent_fields() {
        let result = MigrationResult::failed("1.0.0", "1.1.0".into(), "boom".into(), "bk-1".into());
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(
            value,
            json!({
                "success": false,
                "migratedFrom": "1.0.0",
                "migratedTo": "1.1.0",
                "error": "boom",
                "backupId": "bk-1"
            })
        );
    }
}
