//! Error types for runtime gateway operations.

use thiserror::Error;

/// Result type alias for runtime gateway operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors from driving the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },
}
