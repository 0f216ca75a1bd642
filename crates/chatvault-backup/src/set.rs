//! Backup set discovery, metadata, and verification.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::archive;
use crate::error::BackupResult;
use crate::scope::BackupScope;

/// Directory/archive name prefix for every backup set.
pub const SET_PREFIX: &str = "backup-";

/// Archive suffix for compressed sets.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// First line of a pg_dump plain-format export.
const PG_DUMP_HEADER: &str = "-- PostgreSQL database dump";

/// Descriptive metadata written into every set as `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub created_at: String,
    pub components: BackupScope,
    #[serde(default)]
    pub media_files: u64,
    #[serde(default)]
    pub media_bytes: u64,
    /// SHA-256 of `database.sql`, when the scope includes the database.
    #[serde(default)]
    pub database_sha256: Option<String>,
}

/// Integrity state of a backup set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Valid,
    Corrupt,
}

/// One timestamped backup set on disk.
#[derive(Debug, Clone)]
pub struct BackupSet {
    /// Creation timestamp, `YYYYMMDD-HHMMSS`.
    pub id: String,
    pub path: PathBuf,
    pub compressed: bool,
    pub size: u64,
    pub verification: VerificationStatus,
}

impl BackupSet {
    /// Interpret a directory entry as a backup set, if it looks like one.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let rest = name.strip_prefix(SET_PREFIX)?;
        let (id, compressed) = match rest.strip_suffix(ARCHIVE_SUFFIX) {
            Some(id) => (id, true),
            None => (rest, false),
        };
        if id.is_empty() {
            return None;
        }
        let size = if compressed {
            std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
        } else {
            dir_size(path)
        };
        Some(Self {
            id: id.to_string(),
            path: path.to_path_buf(),
            compressed,
            size,
            verification: VerificationStatus::Unverified,
        })
    }

    /// Load the manifest, when present and readable.
    pub fn manifest(&self) -> Option<Manifest> {
        if self.compressed {
            return None;
        }
        let raw = std::fs::read_to_string(self.path.join("manifest.json")).ok()?;
        serde_json::from_str(&raw).ok()
    }
}

/// Total byte size of a directory tree.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Enumerate backup sets in `dir`, lexicographic (= chronological) order.
pub fn list_sets(dir: &Path) -> BackupResult<Vec<BackupSet>> {
    let mut sets = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sets),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        if let Some(set) = BackupSet::from_path(&entry.path()) {
            sets.push(set);
        }
    }
    sets.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(sets)
}

/// Check a set's integrity.
///
/// Compressed sets must yield a readable entry listing. Uncompressed
/// sets must exist on disk and, when a database dump is expected, the
/// dump must carry the pg_dump header.
pub fn verify(set: &BackupSet) -> VerificationStatus {
    if set.compressed {
        return match archive::list_entries(&set.path) {
            Ok(entries) if !entries.is_empty() => VerificationStatus::Valid,
            Ok(_) => VerificationStatus::Corrupt,
            Err(e) => {
                debug!(set = %set.path.display(), error = %e, "archive listing failed");
                VerificationStatus::Corrupt
            }
        };
    }

    if !set.path.is_dir() {
        return VerificationStatus::Corrupt;
    }

    let expects_database = set
        .manifest()
        .map(|m| m.components.database)
        .unwrap_or_else(|| set.path.join("database.sql").exists());

    if expects_database {
        match std::fs::read_to_string(set.path.join("database.sql")) {
            Ok(dump) if dump_header_ok(&dump) => VerificationStatus::Valid,
            Ok(_) => VerificationStatus::Corrupt,
            Err(_) => VerificationStatus::Corrupt,
        }
    } else {
        VerificationStatus::Valid
    }
}

/// The dump must open with the pg_dump banner within its first lines.
fn dump_header_ok(dump: &str) -> bool {
    dump.lines().take(5).any(|line| line.contains(PG_DUMP_HEADER))
}
