//! `tasklane backups`: operator access to pre-migration snapshots.

use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};
use crate::project::Project;
use anyhow::{Result, bail};
use chrono::{DateTime, Local, Utc};
use clap::Subcommand;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tasklane_core::VersionedDocument;
use tasklane_core::backup::BackupSummary;
use tasklane_core::live::restore_live_document;
use tasklane_core::store::DOCUMENT_KEY;

#[derive(Subcommand, Debug)]
pub enum BackupsCommand {
    /// List backups, newest first.
    List,
    /// Show one backup's metadata and verified snapshot.
    Show {
        /// Backup id (e.g. `bk-000003-1f2e3d4c`).
        id: String,
    },
    /// Write a backup's snapshot back over the live document.
    Restore {
        /// Backup id to restore.
        id: String,
    },
    /// Delete a backup.
    Delete {
        /// Backup id to delete.
        id: String,
    },
}

#[derive(Debug, Serialize)]
struct BackupDetail {
    #[serde(flatten)]
    summary: BackupSummary,
    snapshot: VersionedDocument,
}

#[derive(Debug, Serialize)]
struct RestoreReport {
    id: String,
    key: &'static str,
    version: String,
}

#[derive(Debug, Serialize)]
struct DeleteReport {
    id: String,
    deleted: bool,
}

pub fn run_backups(command: &BackupsCommand, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root)?;
    match command {
        BackupsCommand::List => list(&project, output),
        BackupsCommand::Show { id } => show(&project, id, output),
        BackupsCommand::Restore { id } => restore(&project, id, output),
        BackupsCommand::Delete { id } => delete(&project, id, output),
    }
}

fn list(project: &Project, output: OutputMode) -> Result<()> {
    let backups = project.runner.list_backups()?;
    render_mode(
        output,
        &backups,
        |backups, w| {
            for b in backups {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    b.id,
                    b.version,
                    b.timestamp.to_rfc3339(),
                    b.size_bytes
                )?;
            }
            Ok(())
        },
        |backups, w| {
            pretty_section(w, &format!("Backups ({})", backups.len()))?;
            if backups.is_empty() {
                return writeln!(w, "No backups yet.");
            }
            for b in backups {
                writeln!(
                    w,
                    "{:<20} {:<10} {}  {} bytes",
                    b.id,
                    b.version,
                    local_time(b.timestamp),
                    b.size_bytes
                )?;
            }
            Ok(())
        },
    )
}

fn show(project: &Project, id: &str, output: OutputMode) -> Result<()> {
    let Some(summary) = project
        .runner
        .list_backups()?
        .into_iter()
        .find(|b| b.id == id)
    else {
        bail!("backup {id} not found");
    };
    let Some(snapshot) = project.runner.restore_backup(id)? else {
        bail!("backup {id} not found");
    };
    let detail = BackupDetail { summary, snapshot };

    render_mode(
        output,
        &detail,
        |d, w| {
            writeln!(w, "{}\t{}\t{}", d.summary.id, d.summary.version, d.summary.checksum)?;
            writeln!(w, "{}", d.snapshot.to_json().map_err(std::io::Error::other)?)
        },
        |d, w| {
            pretty_section(w, &format!("Backup {}", d.summary.id))?;
            pretty_kv(w, "version", &d.summary.version)?;
            pretty_kv(w, "taken", local_time(d.summary.timestamp))?;
            pretty_kv(w, "size", format!("{} bytes", d.summary.size_bytes))?;
            pretty_kv(w, "checksum", &d.summary.checksum)?;
            pretty_rule(w)?;
            let body = serde_json::to_string_pretty(&d.snapshot).map_err(std::io::Error::other)?;
            writeln!(w, "{body}")
        },
    )
}

fn restore(project: &Project, id: &str, output: OutputMode) -> Result<()> {
    let lock = project.lock()?;
    let restored =
        restore_live_document(&project.runner, project.store.as_ref(), DOCUMENT_KEY, id)?;
    lock.release();

    let Some(doc) = restored else {
        bail!("backup {id} not found");
    };
    tracing::info!(id, version = %doc.version, "backup restored to live document");

    let report = RestoreReport {
        id: id.to_string(),
        key: DOCUMENT_KEY,
        version: doc.version,
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "restored {} {}", r.id, r.version),
        |r, w| {
            writeln!(
                w,
                "Restored backup {} to {} (version {}).",
                r.id, r.key, r.version
            )
        },
    )
}

fn delete(project: &Project, id: &str, output: OutputMode) -> Result<()> {
    let lock = project.lock()?;
    let deleted = project.runner.delete_backup(id)?;
    lock.release();

    if !deleted {
        bail!("backup {id} not found");
    }
    let report = DeleteReport {
        id: id.to_string(),
        deleted,
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "deleted {}", r.id),
        |r, w| writeln!(w, "Deleted backup {}.", r.id),
    )
}

fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
