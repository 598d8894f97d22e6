//! tasklane-core: versioned data migration and backup engine.
//!
//! The engine brings the application's persisted document up to the latest
//! schema version without ever losing the user's data: it snapshots the
//! document, applies every pending migration in order, and hands back either
//! the migrated document or a backup id to recover from.
//!
//! Components, leaves first: [`version`], [`registry`], [`backup`],
//! [`log`], and [`runner`]. [`live`] wires a runner to the host's live
//! document key.

pub mod backup;
pub mod config;
pub mod document;
pub mod error;
pub mod live;
pub mod lock;
pub mod log;
pub mod registry;
pub mod runner;
pub mod store;
pub mod version;

// Conventions
//
// - Errors: `error::EngineError` for engine operations, `anyhow::Result`
//   inside migration transforms and config loading.
// - Logging: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub use document::VersionedDocument;
pub use error::{EngineError, ErrorCode};
pub use registry::{MigrationRegistry, MigrationStep};
pub use runner::{MigrationResult, MigrationRunner};
