use crate::output::{OutputMode, pretty_section, render_mode};
use crate::project::Project;
use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tasklane_core::log::{LogEntry, LogLevel};

#[derive(Subcommand, Debug)]
pub enum LogCommand {
    /// Print the migration log, oldest first.
    Show {
        /// Only show the most recent N entries.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Only show error entries.
        #[arg(long)]
        errors: bool,
    },
    /// Remove every log entry.
    Clear,
}

#[derive(Debug, Serialize)]
struct ClearReport {
    cleared: usize,
}

pub fn run_log(command: &LogCommand, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::open(project_root)?;
    match command {
        LogCommand::Show { limit, errors } => show(&project, *limit, *errors, output),
        LogCommand::Clear => clear(&project, output),
    }
}

fn select(entries: Vec<LogEntry>, limit: Option<usize>, errors_only: bool) -> Vec<LogEntry> {
    let mut entries: Vec<LogEntry> = entries
        .into_iter()
        .filter(|e| !errors_only || e.level == LogLevel::Error)
        .collect();
    if let Some(limit) = limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }
    entries
}

fn show(project: &Project, limit: Option<usize>, errors_only: bool, output: OutputMode) -> Result<()> {
    let entries = select(project.runner.log().read_all()?, limit, errors_only);
    render_mode(
        output,
        &entries,
        |entries, w| {
            for e in entries {
                writeln!(w, "{}\t{}\t{}", e.timestamp.to_rfc3339(), e.level, e.message)?;
            }
            Ok(())
        },
        |entries, w| {
            pretty_section(w, "Migration log")?;
            if entries.is_empty() {
                return writeln!(w, "(empty)");
            }
            for e in entries {
                let marker = match e.level {
                    LogLevel::Info => " ",
                    LogLevel::Error => "!",
                };
                writeln!(
                    w,
                    "{marker} {}  {}",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.message
                )?;
            }
            Ok(())
        },
    )
}

fn clear(project: &Project, output: OutputMode) -> Result<()> {
    let lock = project.lock()?;
    let cleared = project.runner.log().read_all()?.len();
    project.runner.log().clear()?;
    lock.release();

    render_mode(
        output,
        &ClearReport { cleared },
        |r, w| writeln!(w, "cleared {}", r.cleared),
        |r, w| writeln!(w, "Cleared {} log entries.", r.cleared),
    )
}
