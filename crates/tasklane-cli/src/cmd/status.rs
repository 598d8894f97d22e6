//! `tasklane status`: where the live document stands against the registry.

use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};
use crate::project::Project;
use anyhow::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tasklane_core::EngineError;
use tasklane_core::live::decode_document;
use tasklane_core::store::{DOCUMENT_KEY, KeyValueStore};

#[derive(Debug, Serialize)]
pub struct PendingStep {
    pub target: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub document_present: bool,
    /// Version the document declares; `None` if absent or unversioned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_version: Option<String>,
    pub current_version: String,
    pub needs_migration: bool,
    pub pending: Vec<PendingStep>,
    pub backups: usize,
}

/// Build the status report without touching the store.
///
/// # Errors
///
/// Returns an error if the live document or the backup set is unreadable.
pub fn collect_status(project: &Project) -> Result<StatusReport> {
    let runner = &project.runner;
    let raw = project.store.get(DOCUMENT_KEY).map_err(EngineError::from)?;

    let (document_present, declared_version, needs_migration, pending) = match raw {
        None => (false, None, false, Vec::new()),
        Some(raw) => {
            let (doc, declared) = decode_document(&raw)?;
            let needs = runner.needs_migration(declared.as_deref());
            let pending = if needs {
                runner
                    .registry()
                    .pending_from(&doc.version)
                    .into_iter()
                    .map(|step| PendingStep {
                        target: step.target.to_string(),
                        description: step.description.to_string(),
                    })
                    .collect()
            } else {
                Vec::new()
            };
            (true, declared, needs, pending)
        }
    };

    Ok(StatusReport {
        document_present,
        declared_version,
        current_version: runner.current_version(),
        needs_migration,
        pending,
        backups: runner.list_backups()?.len(),
    })
}

pub fn run_status(output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root)?;
    let report = collect_status(&project)?;
    render_mode(output, &report, render_status_text, render_status_human)
}

fn render_status_text(report: &StatusReport, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "declared={} current={} needs_migration={} backups={}",
        declared_label(report),
        report.current_version,
        report.needs_migration,
        report.backups
    )?;
    for step in &report.pending {
        writeln!(w, "pending {}  {}", step.target, step.description)?;
    }
    Ok(())
}

fn render_status_human(report: &StatusReport, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, "Migration status")?;
    pretty_kv(w, "document", declared_label(report))?;
    pretty_kv(w, "current", &report.current_version)?;
    pretty_kv(
        w,
        "state",
        if report.needs_migration {
            "migration needed"
        } else {
            "up to date"
        },
    )?;
    pretty_kv(w, "backups", report.backups.to_string())?;
    if !report.pending.is_empty() {
        pretty_rule(w)?;
        for step in &report.pending {
            writeln!(w, "  -> {:<10} {}", step.target, step.description)?;
        }
    }
    Ok(())
}

fn declared_label(report: &StatusReport) -> &str {
    match (&report.declared_version, report.document_present) {
        (Some(version), _) => version,
        (None, true) => "unversioned",
        (None, false) => "missing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasklane_core::config::TASKLANE_DIR;
    use tempfile::TempDir;

    fn project_with_document(doc: Option<&str>) -> (TempDir, Project) {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(TASKLANE_DIR)).expect("mkdir");
        let project = Project::open(dir.path()).expect("open");
        if let Some(doc) = doc {
            project.store.set(DOCUMENT_KEY, doc).expect("seed");
        }
        (dir, project)
    }

    #[test]
    fn missing_document_needs_nothing() {
        let (_dir, project) = project_with_document(None);
        let report = collect_status(&project).expect("status");
        assert!(!report.document_present);
        assert!(!report.needs_migration);
        assert!(report.pending.is_empty());
    }

    #[test]
    fn unversioned_document_lists_every_builtin_step() {
        let (_dir, project) = project_with_document(Some(r#"{"tasks":[]}"#));
        let report = collect_status(&project).expect("status");
        assert!(report.document_present);
        assert_eq!(report.declared_version, None);
        assert!(report.needs_migration);
        assert_eq!(report.pending.len(), project.runner.registry().len());
    }

    #[test]
    fn current_document_is_up_to_date() {
        let (_dir, project) = project_with_document(None);
        let current = project.runner.current_version();
        project
            .store
            .set(DOCUMENT_KEY, &format!(r#"{{"version":"{current}"}}"#))
            .expect("seed");

        let report = collect_status(&project).expect("status");
        assert!(!report.needs_migration);
        assert_eq!(report.declared_version.as_deref(), Some(current.as_str()));
    }
}
