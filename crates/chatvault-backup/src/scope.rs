//! Backup scope — which components a set captures.
//!
//! Computed once from the CLI flags; every backup step consults the
//! resulting value instead of re-deriving inclusion from raw flags.

use serde::{Deserialize, Serialize};

/// The set of components a backup captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BackupScope {
    pub database: bool,
    pub config: bool,
    pub media: bool,
    pub logs: bool,
}

impl BackupScope {
    /// Everything: database, config, media, logs.
    pub fn full() -> Self {
        Self {
            database: true,
            config: true,
            media: true,
            logs: true,
        }
    }

    /// Database and config only — the pre-deploy snapshot scope.
    pub fn pre_deploy() -> Self {
        Self {
            database: true,
            config: true,
            media: false,
            logs: false,
        }
    }

    /// Compute the scope from CLI flags.
    ///
    /// Any `*_only` flag restricts the scope to the union of the
    /// explicitly selected components. `exclude_media` drops media from
    /// whatever scope is otherwise selected.
    pub fn from_flags(
        db_only: bool,
        config_only: bool,
        media_only: bool,
        exclude_media: bool,
    ) -> Self {
        let mut scope = if db_only || config_only || media_only {
            Self {
                database: db_only,
                config: config_only,
                media: media_only,
                logs: false,
            }
        } else {
            Self::full()
        };
        if exclude_media {
            scope.media = false;
        }
        scope
    }

    /// True when only the database component is selected.
    pub fn is_database_only(&self) -> bool {
        self.database && !self.config && !self.media && !self.logs
    }

    /// Component names present in this scope, in capture order.
    pub fn components(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.database {
            names.push("database");
        }
        if self.config {
            names.push("config");
        }
        if self.media {
            names.push("media");
        }
        if self.logs {
            names.push("logs");
        }
        names
    }
}
