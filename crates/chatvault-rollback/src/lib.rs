//! chatvault-rollback — restore the stack from a backup set.
//!
//! Restores configuration (and the database, when a dump is present)
//! from a chosen backup set, restarts the runtime, and re-verifies
//! liveness. A safety snapshot of the live configuration is taken
//! before anything is overwritten, so a failed rollback can itself be
//! undone by hand.

pub mod error;
pub mod manager;

pub use error::{RollbackError, RollbackResult};
pub use manager::{RestoreOptions, RollbackManager};
