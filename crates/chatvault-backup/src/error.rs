//! Error types for backup operations.

use thiserror::Error;

/// Result type alias for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors from creating, compressing, verifying, or pruning backup sets.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("runtime gateway error: {0}")]
    Runtime(#[from] chatvault_runtime::RuntimeError),

    #[error("database dump failed with scope restricted to the database: {0}")]
    DatabaseOnly(String),

    #[error("backup completed with failed steps: {0}")]
    StepsFailed(String),

    #[error("compression failed, original directory preserved: {0}")]
    Compression(String),

    #[error("backup set is corrupt: {0}")]
    Corrupt(String),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}
