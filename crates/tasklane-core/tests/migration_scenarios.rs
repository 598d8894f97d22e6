//! End-to-end migration scenarios over an in-memory store.
//!
//! Covers the runner contract from the host's point of view:
//!   - idempotent no-op runs create no backups
//!   - multi-version jumps apply every intermediate step in order
//!   - unknown fields survive the whole chain
//!   - a failing step leaves a restorable pre-run backup

use std::sync::Arc;

use anyhow::anyhow;
use serde_json::json;
use tasklane_core::registry::{MigrationRegistry, MigrationStep};
use tasklane_core::runner::MigrationRunner;
use tasklane_core::store::MemoryStore;
use tasklane_core::version::SemanticVersion;
use tasklane_core::{MigrationResult, VersionedDocument};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn add_saved_views(mut doc: VersionedDocument) -> anyhow::Result<VersionedDocument> {
    doc.insert("savedViews", json!([]));
    Ok(doc)
}

fn add_x(mut doc: VersionedDocument) -> anyhow::Result<VersionedDocument> {
    doc.insert("x", json!(1));
    Ok(doc)
}

fn y_is_x_plus_one(mut doc: VersionedDocument) -> anyhow::Result<VersionedDocument> {
    let x = doc
        .get("x")
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| anyhow!("x must exist before y is derived"))?;
    doc.insert("y", json!(x + 1));
    Ok(doc)
}

fn rename_title(mut doc: VersionedDocument) -> anyhow::Result<VersionedDocument> {
    if let Some(title) = doc.remove("title") {
        doc.insert("name", title);
    }
    Ok(doc)
}

fn always_fails(_: VersionedDocument) -> anyhow::Result<VersionedDocument> {
    Err(anyhow!("step 1.2.0 cannot parse legacy board layout"))
}

fn step(target: &str, description: &'static str, transform: tasklane_core::registry::TransformFn) -> MigrationStep {
    MigrationStep::new(SemanticVersion::parse(target), description, transform)
}

fn runner_with(steps: Vec<MigrationStep>) -> MigrationRunner {
    let store = Arc::new(MemoryStore::new());
    let registry = MigrationRegistry::new(steps).expect("registry must be ascending");
    MigrationRunner::new(registry, store)
}

fn expect_success(result: &MigrationResult) -> &VersionedDocument {
    assert!(result.success, "run failed: {:?}", result.error);
    result.data.as_ref().expect("successful runs carry data")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn unversioned_document_gains_saved_views() {
    let runner = runner_with(vec![step("1.0.0", "Initialize saved views", add_saved_views)]);
    let original = VersionedDocument::new("0.0.0");

    let result = runner.run(original.clone(), "0.0.0").expect("run");
    let data = expect_success(&result);

    assert_eq!(
        serde_json::to_value(data).expect("serialize"),
        json!({"version": "1.0.0", "savedViews": []})
    );
    assert_eq!(result.migrated_from, "0.0.0");
    assert_eq!(result.migrated_to, "1.0.0");

    let backup_id = result.backup_id.as_deref().expect("backup id");
    let restored = runner.restore_backup(backup_id).expect("restore").expect("present");
    assert_eq!(restored, original);
}

#[test]
fn running_at_current_version_twice_is_a_no_op() {
    let runner = runner_with(vec![
        step("1.1.0", "add x", add_x),
        step("1.2.0", "derive y", y_is_x_plus_one),
    ]);
    let current = runner.current_version();
    let doc = VersionedDocument::new(current.clone()).with_field("tasks", json!([{"id": 1}]));

    let first = runner.run(doc.clone(), &current).expect("first run");
    let second = runner.run(doc.clone(), &current).expect("second run");

    assert_eq!(first.data.as_ref(), Some(&doc));
    assert_eq!(second.data.as_ref(), Some(&doc));
    assert!(first.backup_id.is_none());
    assert!(second.backup_id.is_none());
    assert!(runner.list_backups().expect("list").is_empty());
}

#[test]
fn short_form_current_version_is_also_a_no_op() {
    let runner = runner_with(vec![step("1.2.0", "add x", add_x)]);
    let result = runner.run(VersionedDocument::new("1.2"), "1.2").expect("run");
    assert!(result.success);
    assert_eq!(result.migrated_to, "1.2");
    assert!(result.backup_id.is_none());
}

#[test]
fn intermediate_steps_are_never_skipped() {
    let runner = runner_with(vec![
        step("1.1.0", "add x", add_x),
        step("1.2.0", "derive y", y_is_x_plus_one),
    ]);

    let result = runner.run(VersionedDocument::new("1.0.0"), "1.0.0").expect("run");
    let data = expect_success(&result);
    assert_eq!(data.get("x"), Some(&json!(1)));
    assert_eq!(data.get("y"), Some(&json!(2)));
    assert_eq!(data.version, "1.2.0");
}

#[test]
fn partially_migrated_document_only_runs_remaining_steps() {
    let runner = runner_with(vec![
        step("1.1.0", "add x", add_x),
        step("1.2.0", "derive y", y_is_x_plus_one),
    ]);
    let doc = VersionedDocument::new("1.1.0").with_field("x", json!(41));

    let result = runner.run(doc, "1.1.0").expect("run");
    let data = expect_success(&result);
    assert_eq!(data.get("x"), Some(&json!(41)));
    assert_eq!(data.get("y"), Some(&json!(42)));
}

#[test]
fn unknown_fields_survive_the_chain() {
    let runner = runner_with(vec![
        step("1.1.0", "add x", add_x),
        step("1.2.0", "derive y", y_is_x_plus_one),
        step("1.3.0", "rename title", rename_title),
    ]);
    let doc = VersionedDocument::new("1.0.0")
        .with_field("title", json!("Board"))
        .with_field("pluginState", json!({"calendar": {"zoom": 3}}));

    let result = runner.run(doc, "1.0.0").expect("run");
    let data = expect_success(&result);

    assert_eq!(data.get("pluginState"), Some(&json!({"calendar": {"zoom": 3}})));
    assert_eq!(data.get("name"), Some(&json!("Board")));
    assert!(!data.contains("title"), "explicitly removed fields stay removed");
}

#[test]
fn failing_second_step_reports_first_target_and_keeps_backup() {
    let runner = runner_with(vec![
        step("1.1.0", "add x", add_x),
        step("1.2.0", "convert layout", always_fails),
    ]);
    let original = VersionedDocument::new("1.0.0").with_field("columns", json!(["todo", "done"]));

    let result = runner.run(original.clone(), "1.0.0").expect("run");

    assert!(!result.success);
    assert_eq!(result.migrated_to, "1.1.0");
    assert!(result.data.is_none());
    assert!(
        result
            .error
            .as_deref()
            .is_some_and(|e| e.contains("legacy board layout"))
    );

    let backup_id = result.backup_id.as_deref().expect("backup id");
    let restored = runner.restore_backup(backup_id).expect("restore").expect("present");
    assert_eq!(restored, original);
}

#[test]
fn retry_after_failure_starts_from_original_version() {
    let runner = runner_with(vec![
        step("1.1.0", "add x", add_x),
        step("1.2.0", "convert layout", always_fails),
    ]);
    let original = VersionedDocument::new("1.0.0");

    let first = runner.run(original.clone(), "1.0.0").expect("first run");
    let second = runner.run(original, "1.0.0").expect("retry");

    assert_eq!(first.migrated_to, second.migrated_to);
    assert_eq!(first.error, second.error);
    assert_ne!(first.backup_id, second.backup_id);
    assert_eq!(runner.list_backups().expect("list").len(), 2);
}

#[test]
fn backups_are_bounded_to_most_recent_runs() {
    let runner = runner_with(vec![step("1.1.0", "add x", add_x)]);

    let ids: Vec<String> = (0..5)
        .map(|i| {
            let doc = VersionedDocument::new("1.0.0").with_field("run", json!(i));
            runner
                .run(doc, "1.0.0")
                .expect("run")
                .backup_id
                .expect("backup id")
        })
        .collect();

    let listed: Vec<String> = runner
        .list_backups()
        .expect("list")
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(listed, [ids[4].clone(), ids[3].clone(), ids[2].clone()]);
    assert_eq!(runner.restore_backup(&ids[0]).expect("restore"), None);
}

#[test]
fn builtin_registry_migrates_a_legacy_board() {
    let store = Arc::new(MemoryStore::new());
    let runner = MigrationRunner::new(MigrationRegistry::builtin().expect("builtin"), store);
    let legacy = VersionedDocument::new("0.9.0")
        .with_field("tasks", json!([{"id": "t1", "title": "Write report"}]))
        .with_field("pomodoroLog", json!([{"taskId": "t1", "minutes": 25}]))
        .with_field("theme", json!("solarized"));

    let result = runner.run(legacy, "0.9.0").expect("run");
    let data = expect_success(&result);

    assert_eq!(data.version, runner.current_version());
    assert_eq!(data.get("savedViews"), Some(&json!([])));
    assert_eq!(
        data.get("tasks"),
        Some(&json!([{"id": "t1", "title": "Write report", "archived": false}]))
    );
    assert_eq!(
        data.get("timeEntries"),
        Some(&json!([{"taskId": "t1", "minutes": 25, "source": "pomodoro"}]))
    );
    assert!(!data.contains("pomodoroLog"));
    assert_eq!(data.get("theme"), Some(&json!("solarized")));
}
