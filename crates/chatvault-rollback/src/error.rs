//! Error types for rollback operations.

use thiserror::Error;

/// Result type alias for rollback operations.
pub type RollbackResult<T> = Result<T, RollbackError>;

/// Errors from restoring a backup set.
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("no backup sets found in {0}")]
    NoBackups(String),

    #[error("refusing to restore from unverified or corrupt set: {0}")]
    NotVerified(String),

    #[error("backup set is missing required member {0}")]
    MissingRequired(String),

    #[error("restore declined by operator")]
    Declined,

    #[error("datastore did not become ready after {attempts} attempts")]
    DatastoreNotReady { attempts: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("runtime gateway error: {0}")]
    Runtime(#[from] chatvault_runtime::RuntimeError),

    #[error("backup error: {0}")]
    Backup(#[from] chatvault_backup::BackupError),
}
