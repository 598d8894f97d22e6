//! `tasklane migrate`: upgrade the live document under the run lock.
//!
//! The live key is only rewritten when every pending step succeeds. On
//! failure the command prints the backup id to recover from and exits 1.

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use crate::project::Project;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tasklane_core::MigrationResult;
use tasklane_core::live::{LiveUpgrade, upgrade_live_document};
use tasklane_core::store::DOCUMENT_KEY;

/// Returned after a failed run has been reported on stdout.
#[derive(Debug)]
pub struct MigrationFailed {
    pub error: String,
    pub backup_id: Option<String>,
}

impl fmt::Display for MigrationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "migration failed: {}", self.error)
    }
}

impl std::error::Error for MigrationFailed {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MigrateReport {
    outcome: &'static str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    migrated_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    migrated_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl MigrateReport {
    const fn missing() -> Self {
        Self {
            outcome: "missing",
            success: true,
            migrated_from: None,
            migrated_to: None,
            backup_id: None,
            error: None,
        }
    }

    fn from_result(result: MigrationResult) -> Self {
        let outcome = match (result.success, result.wrote_backup()) {
            (false, _) => "failed",
            (true, false) => "unchanged",
            (true, true) => "migrated",
        };
        Self {
            outcome,
            success: result.success,
            migrated_from: Some(result.migrated_from),
            migrated_to: Some(result.migrated_to),
            backup_id: result.backup_id,
            error: result.error,
        }
    }
}

pub fn run_migrate(output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root)?;
    let lock = project.lock()?;
    let outcome = upgrade_live_document(&project.runner, project.store.as_ref(), DOCUMENT_KEY)?;
    lock.release();

    let report = match outcome {
        LiveUpgrade::Missing => MigrateReport::missing(),
        LiveUpgrade::Ran(result) => MigrateReport::from_result(result),
    };

    render_mode(output, &report, render_migrate_text, render_migrate_human)?;

    if report.success {
        Ok(())
    } else {
        Err(MigrationFailed {
            error: report.error.unwrap_or_default(),
            backup_id: report.backup_id,
        }
        .into())
    }
}

fn render_migrate_text(report: &MigrateReport, w: &mut dyn Write) -> std::io::Result<()> {
    write!(w, "{}", report.outcome)?;
    if let (Some(from), Some(to)) = (&report.migrated_from, &report.migrated_to) {
        write!(w, " {from} -> {to}")?;
    }
    if let Some(id) = &report.backup_id {
        write!(w, " backup={id}")?;
    }
    writeln!(w)
}

fn render_migrate_human(report: &MigrateReport, w: &mut dyn Write) -> std::io::Result<()> {
    match report.outcome {
        "missing" => return writeln!(w, "No document stored yet; nothing to migrate."),
        "unchanged" => pretty_section(w, "Document already at current version")?,
        "migrated" => pretty_section(w, "Migration complete")?,
        _ => pretty_section(w, "Migration FAILED; live document left untouched")?,
    }
    if let Some(from) = &report.migrated_from {
        pretty_kv(w, "from", from)?;
    }
    if let Some(to) = &report.migrated_to {
        pretty_kv(w, "reached", to)?;
    }
    if let Some(id) = &report.backup_id {
        pretty_kv(w, "backup", id)?;
    }
    if let Some(err) = &report.error {
        pretty_kv(w, "error", err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasklane_core::VersionedDocument;

    #[test]
    fn report_outcome_follows_result_shape() {
        let unchanged = MigrationResult {
            success: true,
            migrated_from: "1.2.0".into(),
            migrated_to: "1.2.0".into(),
            data: Some(VersionedDocument::new("1.2.0")),
            error: None,
            backup_id: None,
        };
        assert_eq!(MigrateReport::from_result(unchanged).outcome, "unchanged");

        let failed = MigrationResult {
            success: false,
            migrated_from: "1.0.0".into(),
            migrated_to: "1.0.0".into(),
            data: None,
            error: Some("boom".into()),
            backup_id: Some("bk-000001-deadbeef".into()),
        };
        let report = MigrateReport::from_result(failed);
        assert_eq!(report.outcome, "failed");
        assert_eq!(report.backup_id.as_deref(), Some("bk-000001-deadbeef"));
    }
}
