//! Ordered catalog of document migrations.
//!
//! New migrations are appended to [`BUILTIN_MIGRATIONS`]; never reorder or
//! remove an entry once it has shipped. The last entry's target is the
//! latest schema version this binary understands.

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::document::VersionedDocument;
use crate::error::RegistryError;
use crate::version::SemanticVersion;

/// Schema version reported when no migrations are registered.
pub const BASELINE_VERSION: &str = "1.0.0";

/// A pure transform from a document to the next schema revision.
///
/// Returning `Err` stops the run; the runner reports it as a failed
/// migration and keeps the pre-run backup as the recovery point.
pub type TransformFn = fn(VersionedDocument) -> Result<VersionedDocument>;

/// One registered migration.
#[derive(Clone, Copy)]
pub struct MigrationStep {
    pub target: SemanticVersion,
    pub description: &'static str,
    pub transform: TransformFn,
}

impl MigrationStep {
    #[must_use]
    pub const fn new(
        target: SemanticVersion,
        description: &'static str,
        transform: TransformFn,
    ) -> Self {
        Self {
            target,
            description,
            transform,
        }
    }

    /// Run this step's transform.
    ///
    /// # Errors
    ///
    /// Propagates whatever the transform returns.
    pub fn apply(&self, doc: VersionedDocument) -> Result<VersionedDocument> {
        (self.transform)(doc)
    }
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("target", &self.target)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Migrations shipped with the application, ascending by target.
pub const BUILTIN_MIGRATIONS: &[MigrationStep] = &[
    MigrationStep::new(
        SemanticVersion::new(1, 0, 0),
        "Initialize saved views",
        add_saved_views,
    ),
    MigrationStep::new(
        SemanticVersion::new(1, 1, 0),
        "Add archived flag to tasks",
        add_task_archived_flag,
    ),
    MigrationStep::new(
        SemanticVersion::new(1, 2, 0),
        "Introduce time tracking ledger",
        introduce_time_entries,
    ),
];

/// Immutable, validated list of migrations.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    steps: Vec<MigrationStep>,
}

impl MigrationRegistry {
    /// Build a registry, rejecting lists that are not strictly ascending.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on a duplicate or out-of-order target.
    pub fn new(steps: Vec<MigrationStep>) -> Result<Self, RegistryError> {
        validate_order(&steps)?;
        Ok(Self { steps })
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    /// The registry of migrations shipped with this binary.
    ///
    /// # Errors
    ///
    /// Only fails if [`BUILTIN_MIGRATIONS`] is misordered, which the test
    /// suite guards against.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(BUILTIN_MIGRATIONS.to_vec())
    }

    /// Latest schema version known to this registry.
    #[must_use]
    pub fn current_version(&self) -> String {
        self.steps
            .last()
            .map_or_else(|| BASELINE_VERSION.to_string(), |step| step.target.to_string())
    }

    /// Every step whose target is newer than `from`, in registry order.
    #[must_use]
    pub fn pending_from(&self, from: &str) -> Vec<&MigrationStep> {
        let from = SemanticVersion::parse(from);
        self.steps.iter().filter(|step| step.target > from).collect()
    }

    #[must_use]
    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn validate_order(steps: &[MigrationStep]) -> Result<(), RegistryError> {
    for pair in steps.windows(2) {
        let (previous, next) = (pair[0].target, pair[1].target);
        if previous == next {
            return Err(RegistryError::DuplicateTarget(next));
        }
        if previous > next {
            return Err(RegistryError::OutOfOrder { previous, next });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Built-in transforms
// ---------------------------------------------------------------------------

fn add_saved_views(mut doc: VersionedDocument) -> Result<VersionedDocument> {
    doc.insert_if_absent("savedViews", json!([]));
    Ok(doc)
}

fn add_task_archived_flag(mut doc: VersionedDocument) -> Result<VersionedDocument> {
    match doc.get_mut("tasks") {
        None | Some(Value::Null) => {}
        Some(Value::Array(tasks)) => {
            for task in tasks.iter_mut().filter_map(Value::as_object_mut) {
                task.entry("archived").or_insert(Value::Bool(false));
            }
        }
        Some(other) => {
            return Err(anyhow!(
                "expected `tasks` to be an array, found {}",
                json_kind(other)
            ));
        }
    }
    Ok(doc)
}

/// Folds the legacy `pomodoroLog` into `timeEntries`.
fn introduce_time_entries(mut doc: VersionedDocument) -> Result<VersionedDocument> {
    doc.insert_if_absent("timeEntries", json!([]));

    let Some(legacy) = doc.remove("pomodoroLog") else {
        return Ok(doc);
    };
    let sessions = match legacy {
        Value::Array(sessions) => sessions,
        other => {
            return Err(anyhow!(
                "expected `pomodoroLog` to be an array, found {}",
                json_kind(&other)
            ));
        }
    };

    let Some(Value::Array(entries)) = doc.get_mut("timeEntries") else {
        return Err(anyhow!("expected `timeEntries` to be an array"));
    };
    for mut session in sessions {
        if let Some(obj) = session.as_object_mut() {
            obj.entry("source").or_insert_with(|| json!("pomodoro"));
        }
        entries.push(session);
    }
    Ok(doc)
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
