use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tasklane_core::config::{EngineConfig, TASKLANE_DIR, config_path, load_engine_config};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the config file even if `.tasklane/` already exists. The
    /// existing `[store]` settings are kept so backups stay reachable.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "run.lock\nstore/\n";

#[derive(Debug, Serialize)]
struct InitReport {
    root: String,
    config: String,
    store: String,
}

/// Execute `tasklane init`. Creates the project skeleton:
///
/// ```text
/// .tasklane/
///   config.toml   (every setting at its default)
///   store/        (one <key>.json per persisted key)
///   .gitignore    (run.lock, store/)
/// ```
///
/// # Errors
///
/// Returns an error if `.tasklane/` already exists and `--force` is not set,
/// or if any filesystem operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let dir = project_root.join(TASKLANE_DIR);
    if dir.exists() && !args.force {
        anyhow::bail!("{TASKLANE_DIR}/ already exists. Use `tasklane init --force` to reinitialize.");
    }

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let config = starter_config(project_root);
    let config_file = config_path(project_root);
    std::fs::write(&config_file, config.to_toml()?)
        .with_context(|| format!("Failed to write config: {}", config_file.display()))?;

    let store_dir = config.store_dir(project_root);
    std::fs::create_dir_all(&store_dir)
        .with_context(|| format!("Failed to create store: {}", store_dir.display()))?;

    let gitignore = dir.join(".gitignore");
    std::fs::write(&gitignore, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore.display()))?;

    tracing::info!(root = %project_root.display(), "project initialized");

    let report = InitReport {
        root: project_root.display().to_string(),
        config: config_file.display().to_string(),
        store: store_dir.display().to_string(),
    };
    render_mode(
        output,
        &report,
        |r, w| writeln!(w, "initialized {}", r.root),
        |r, w| {
            pretty_section(w, "Initialized .tasklane/ project structure")?;
            pretty_kv(w, "config", &r.config)?;
            pretty_kv(w, "store", &r.store)?;
            writeln!(w)?;
            writeln!(w, "Next: place the app document at {}/app-state.json", r.store)?;
            writeln!(w, "      then run `tasklane status`.")
        },
    )
}

/// Defaults, except that an existing project keeps its store location.
fn starter_config(project_root: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    match load_engine_config(project_root) {
        Ok(existing) => config.store = existing.store,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "existing config unreadable; using defaults");
        }
    }
    config
}
