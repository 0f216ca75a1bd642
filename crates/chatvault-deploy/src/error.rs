//! Error types for deployment orchestration.

use thiserror::Error;

/// Result type alias for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors from the deployment orchestrator.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A precondition failed before any state change.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("unknown strategy: {0} (expected rolling, blue-green, or recreate)")]
    UnknownStrategy(String),

    /// Blue-green gate failed before the old instances were retired.
    #[error("blue-green health check critical; old instances left running")]
    BlueGreenUnhealthy,

    #[error("backup error: {0}")]
    Backup(#[from] chatvault_backup::BackupError),

    #[error("runtime gateway error: {0}")]
    Runtime(#[from] chatvault_runtime::RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
