#![forbid(unsafe_code)]

mod cmd;
mod output;
mod project;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tasklane_core::error::ErrorCode;
use tasklane_core::lock::LockError;
use tasklane_core::EngineError;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tasklane: versioned data migrations with backup and recovery",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Project directory to operate on (defaults to the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        resolve_output_mode(self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Initialize a tasklane project",
        after_help = "EXAMPLES:\n    tasklane init\n    tasklane init --force --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(about = "Show the live document version and pending migrations")]
    Status,

    #[command(
        about = "Migrate the live document to the current version",
        long_about = "Back up the live document, apply every pending migration in order, and \
                      write the result back. On failure the live document is left untouched \
                      and the backup id to recover from is printed."
    )]
    Migrate,

    #[command(about = "Inspect, restore, or delete backups")]
    Backups {
        #[command(subcommand)]
        command: cmd::backups::BackupsCommand,
    },

    #[command(about = "Show or clear the migration log")]
    Log {
        #[command(subcommand)]
        command: cmd::log::LogCommand,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TASKLANE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "tasklane=debug,info"
        } else {
            "tasklane=info,warn"
        })
    });

    let format = env::var("TASKLANE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Map a command failure onto a structured error with code and hint.
fn classify(err: &anyhow::Error) -> CliError {
    if let Some(e) = err.downcast_ref::<EngineError>() {
        return CliError::from(e);
    }
    if let Some(e) = err.downcast_ref::<LockError>() {
        return CliError::from(e);
    }
    if let Some(e) = err.downcast_ref::<project::NotInitialized>() {
        let code = ErrorCode::NotInitialized;
        return CliError::with_details(e.to_string(), code.hint().unwrap_or_default(), code.code());
    }
    if let Some(e) = err.downcast_ref::<project::ConfigInvalid>() {
        let code = ErrorCode::ConfigParseError;
        return CliError::with_details(e.to_string(), code.hint().unwrap_or_default(), code.code());
    }
    if let Some(e) = err.downcast_ref::<cmd::migrate::MigrationFailed>() {
        return CliError {
            message: e.to_string(),
            suggestion: e.backup_id.as_ref().map(|id| {
                format!("The live document was not modified. Backup {id} holds the pre-run snapshot.")
            }),
            error_code: None,
        };
    }
    CliError::new(format!("{err:#}"))
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let output = cli.output_mode();
    let project_root = match cli.root.clone().map_or_else(env::current_dir, Ok) {
        Ok(root) => root,
        Err(err) => {
            let _ = render_error(output, &CliError::new(format!("cannot resolve project root: {err}")));
            return ExitCode::FAILURE;
        }
    };

    let result = match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, &project_root),
        Commands::Status => cmd::status::run_status(output, &project_root),
        Commands::Migrate => cmd::migrate::run_migrate(output, &project_root),
        Commands::Backups { command } => {
            cmd::backups::run_backups(command, output, &project_root)
        }
        Commands::Log { command } => cmd::log::run_log(command, output, &project_root),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = %format!("{err:#}"), "command failed");
            if render_error(output, &classify(&err)).is_err() {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
