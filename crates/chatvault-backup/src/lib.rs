//! chatvault-backup — timestamped backup sets for the archive stack.
//!
//! A backup set captures a selectable subset of {database, config,
//! media, logs} into one timestamped directory (optionally compressed
//! into a single tar.gz archive). The filesystem location under the
//! output directory is the sole source of truth — discovery is by
//! directory listing, ordered by the timestamp in the name.

pub mod archive;
pub mod error;
pub mod manager;
pub mod retention;
pub mod scope;
pub mod set;

pub use error::{BackupError, BackupResult};
pub use manager::{BackupManager, BackupOptions};
pub use retention::prune;
pub use scope::BackupScope;
pub use set::{list_sets, verify, BackupSet, Manifest, VerificationStatus};
