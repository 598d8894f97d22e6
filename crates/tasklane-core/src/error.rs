use std::fmt;

use crate::version::SemanticVersion;

/// Machine-readable error codes for operator tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    InvalidRegistry,
    StoreReadFailed,
    StoreWriteFailed,
    CorruptBackupSet,
    BackupChecksumMismatch,
    CorruptDocument,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InvalidRegistry => "E2001",
            Self::StoreReadFailed => "E3001",
            Self::StoreWriteFailed => "E3002",
            Self::CorruptBackupSet => "E4001",
            Self::BackupChecksumMismatch => "E4002",
            Self::CorruptDocument => "E4003",
            Self::LockContention => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidRegistry => "Migration registry is misordered",
            Self::StoreReadFailed => "Persisted store read failed",
            Self::StoreWriteFailed => "Persisted store write failed",
            Self::CorruptBackupSet => "Backup set is unreadable",
            Self::BackupChecksumMismatch => "Backup snapshot checksum mismatch",
            Self::CorruptDocument => "Persisted document is unreadable",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `tasklane init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .tasklane/config.toml and retry."),
            Self::InvalidRegistry => {
                Some("Migrations must be listed in strictly ascending target version order.")
            }
            Self::StoreReadFailed => Some("Check that the store directory is readable."),
            Self::StoreWriteFailed => {
                Some("Check disk space and write permissions. No migration was applied.")
            }
            Self::CorruptBackupSet => {
                Some("Inspect the backup set file by hand; it was left untouched.")
            }
            Self::BackupChecksumMismatch => {
                Some("The snapshot was modified after capture. Restore a different backup.")
            }
            Self::CorruptDocument => Some("Restore the document from a backup."),
            Self::LockContention => {
                Some("Retry after the other `tasklane` process releases its lock.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failure of the external key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read key `{key}`: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write key `{key}`: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The registry was constructed from a list that is not strictly ascending.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("migration {next} is listed after {previous}")]
    OutOfOrder {
        previous: SemanticVersion,
        next: SemanticVersion,
    },

    #[error("duplicate migration target {0}")]
    DuplicateTarget(SemanticVersion),
}

/// Errors returned by fallible engine operations.
///
/// A failing migration step is not one of these: it is reported through a
/// failed [`MigrationResult`](crate::runner::MigrationResult).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("backup set is unreadable: {0}")]
    CorruptBackupSet(String),

    #[error("persisted document is unreadable: {0}")]
    CorruptDocument(String),

    #[error("backup {id} failed checksum verification")]
    ChecksumMismatch { id: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl EngineError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Store(StoreError::Read { .. }) => ErrorCode::StoreReadFailed,
            Self::Store(StoreError::Write { .. } | StoreError::Unavailable(_))
            | Self::Serialize { .. } => ErrorCode::StoreWriteFailed,
            Self::CorruptBackupSet(_) => ErrorCode::CorruptBackupSet,
            Self::CorruptDocument(_) => ErrorCode::CorruptDocument,
            Self::ChecksumMismatch { .. } => ErrorCode::BackupChecksumMismatch,
            Self::Registry(_) => ErrorCode::InvalidRegistry,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
