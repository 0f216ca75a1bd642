//! Retention pruning for backup sets.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::error::BackupResult;
use crate::set::list_sets;

/// Pick the paths whose modification time is older than `retention_days`
/// relative to `now`. `retention_days <= 0` disables pruning.
pub fn select_expired(
    entries: &[(PathBuf, SystemTime)],
    retention_days: i64,
    now: SystemTime,
) -> Vec<PathBuf> {
    if retention_days <= 0 {
        return Vec::new();
    }
    let max_age = Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    entries
        .iter()
        .filter(|(_, mtime)| {
            now.duration_since(*mtime)
                .map(|age| age > max_age)
                .unwrap_or(false)
        })
        .map(|(path, _)| path.clone())
        .collect()
}

/// Delete every backup set in `dir` older than `retention_days`.
///
/// Best-effort: a set that cannot be deleted is logged and skipped.
/// Returns the number of sets removed.
pub fn prune(dir: &Path, retention_days: i64) -> BackupResult<usize> {
    if retention_days <= 0 {
        return Ok(0);
    }

    let entries: Vec<(PathBuf, SystemTime)> = list_sets(dir)?
        .into_iter()
        .filter_map(|set| {
            let mtime = std::fs::metadata(&set.path).and_then(|m| m.modified()).ok()?;
            Some((set.path, mtime))
        })
        .collect();

    let expired = select_expired(&entries, retention_days, SystemTime::now());
    let mut removed = 0;
    for path in expired {
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                info!(set = %path.display(), "pruned expired backup set");
                removed += 1;
            }
            Err(e) => warn!(set = %path.display(), error = %e, "failed to prune backup set"),
        }
    }
    Ok(removed)
}

/// Keep only the `keep` newest sets in `dir`, deleting the rest.
///
/// Used by the deploy orchestrator for its own pre-deploy snapshots,
/// independent of the age-based retention policy.
pub fn retain_newest(dir: &Path, keep: usize) -> BackupResult<usize> {
    let sets = list_sets(dir)?;
    if sets.len() <= keep {
        return Ok(0);
    }
    let excess = sets.len() - keep;
    let mut removed = 0;
    // list_sets returns oldest-first; the head is the excess.
    for set in sets.into_iter().take(excess) {
        let result = if set.compressed {
            std::fs::remove_file(&set.path)
        } else {
            std::fs::remove_dir_all(&set.path)
        };
        match result {
            Ok(()) => {
                info!(set = %set.path.display(), "removed old pre-deploy backup");
                removed += 1;
            }
            Err(e) => warn!(set = %set.path.display(), error = %e, "failed to remove backup"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn entry(name: &str, age: Duration, now: SystemTime) -> (PathBuf, SystemTime) {
        (PathBuf::from(name), now - age)
    }

    #[test]
    fn nothing_older_than_retention_survives_selection() {
        let now = SystemTime::now();
        let entries = vec![
            entry("backup-a", DAY * 10, now),
            entry("backup-b", DAY * 3, now),
            entry("backup-c", DAY * 8, now),
        ];
        let expired = select_expired(&entries, 7, now);
        assert_eq!(
            expired,
            vec![PathBuf::from("backup-a"), PathBuf::from("backup-c")]
        );
    }

    #[test]
    fn boundary_set_is_retained() {
        let now = SystemTime::now();
        let entries = vec![entry("backup-exact", DAY * 7, now)];
        assert!(select_expired(&entries, 7, now).is_empty());
    }

    #[test]
    fn zero_or_negative_retention_disables_pruning() {
        let now = SystemTime::now();
        let entries = vec![entry("backup-ancient", DAY * 1000, now)];
        assert!(select_expired(&entries, 0, now).is_empty());
        assert!(select_expired(&entries, -5, now).is_empty());
    }

    #[test]
    fn prune_leaves_fresh_sets_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("backup-20250101-000000")).unwrap();
        let removed = prune(dir.path(), 7).unwrap();
        assert_eq!(removed, 0);
        assert!(dir.path().join("backup-20250101-000000").exists());
    }

    #[test]
    fn retain_newest_drops_the_oldest() {
        let dir = tempfile::tempdir().unwrap();
        for id in [
            "20250101-000000",
            "20250102-000000",
            "20250103-000000",
            "20250104-000000",
        ] {
            std::fs::create_dir(dir.path().join(format!("backup-{id}"))).unwrap();
        }

        let removed = retain_newest(dir.path(), 2).unwrap();
        assert_eq!(removed, 2);
        assert!(!dir.path().join("backup-20250101-000000").exists());
        assert!(!dir.path().join("backup-20250102-000000").exists());
        assert!(dir.path().join("backup-20250103-000000").exists());
        assert!(dir.path().join("backup-20250104-000000").exists());
    }

    #[test]
    fn retain_newest_noop_under_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("backup-20250101-000000")).unwrap();
        assert_eq!(retain_newest(dir.path(), 5).unwrap(), 0);
    }
}
