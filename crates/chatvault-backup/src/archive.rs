//! Backup set compression — tar.gz packing and entry listing.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, warn};

use crate::error::{BackupError, BackupResult};
use crate::set::ARCHIVE_SUFFIX;

/// Pack a backup set directory into `<dir>.tar.gz`.
///
/// The original directory is deleted only after the archive has been
/// confirmed readable; on any failure the directory is preserved and a
/// partial archive is removed.
pub fn compress(set_dir: &Path) -> BackupResult<PathBuf> {
    let archive_path = archive_path_for(set_dir);
    let set_name = set_dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BackupError::Compression("set directory has no name".to_string()))?;

    let result = write_archive(set_dir, &archive_path, set_name);
    if let Err(e) = result {
        let _ = std::fs::remove_file(&archive_path);
        return Err(BackupError::Compression(e.to_string()));
    }

    // Readability gate before the original is dropped.
    match list_entries(&archive_path) {
        Ok(entries) if !entries.is_empty() => {}
        Ok(_) => {
            let _ = std::fs::remove_file(&archive_path);
            return Err(BackupError::Compression("archive is empty".to_string()));
        }
        Err(e) => {
            let _ = std::fs::remove_file(&archive_path);
            return Err(BackupError::Compression(format!(
                "archive readback failed: {e}"
            )));
        }
    }

    if let Err(e) = std::fs::remove_dir_all(set_dir) {
        warn!(
            dir = %set_dir.display(),
            error = %e,
            "archive written but original directory could not be removed"
        );
    }

    info!(archive = %archive_path.display(), "backup set compressed");
    Ok(archive_path)
}

fn write_archive(set_dir: &Path, archive_path: &Path, set_name: &str) -> std::io::Result<()> {
    let file = File::create(archive_path)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(set_name, set_dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Relative paths of every file entry in the archive.
pub fn list_entries(archive_path: &Path) -> BackupResult<Vec<PathBuf>> {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);

    let mut entries = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_file() {
            entries.push(entry.path()?.into_owned());
        }
    }
    Ok(entries)
}

/// Unpack an archived set into `dest`, returning the extracted set dir.
pub fn extract(archive_path: &Path, dest: &Path) -> BackupResult<PathBuf> {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest)?;

    let set_name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(ARCHIVE_SUFFIX))
        .ok_or_else(|| BackupError::Corrupt("archive has no set name".to_string()))?;
    Ok(dest.join(set_name))
}

fn archive_path_for(set_dir: &Path) -> PathBuf {
    let mut name = set_dir.as_os_str().to_os_string();
    name.push(ARCHIVE_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn make_set(root: &Path) -> PathBuf {
        let set_dir = root.join("backup-20250101-120000");
        std::fs::create_dir_all(set_dir.join("config")).unwrap();
        std::fs::write(set_dir.join("database.sql"), "-- PostgreSQL database dump\n").unwrap();
        std::fs::write(set_dir.join("config/.env"), "SECRET=x\n").unwrap();
        std::fs::write(set_dir.join("manifest.json"), "{}\n").unwrap();
        set_dir
    }

    #[test]
    fn compress_roundtrip_preserves_file_set() {
        let dir = tempfile::tempdir().unwrap();
        let set_dir = make_set(dir.path());

        let before: BTreeSet<PathBuf> = walkdir::WalkDir::new(&set_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        let archive_path = compress(&set_dir).unwrap();
        assert!(archive_path.exists());
        assert!(!set_dir.exists(), "original deleted after verification");

        let after: BTreeSet<PathBuf> = list_entries(&archive_path).unwrap().into_iter().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn extract_restores_the_set_directory() {
        let dir = tempfile::tempdir().unwrap();
        let set_dir = make_set(dir.path());
        let archive_path = compress(&set_dir).unwrap();

        let out = tempfile::tempdir().unwrap();
        let extracted = extract(&archive_path, out.path()).unwrap();
        assert_eq!(
            extracted.file_name().unwrap().to_str().unwrap(),
            "backup-20250101-120000"
        );
        let dump = std::fs::read_to_string(extracted.join("database.sql")).unwrap();
        assert!(dump.contains("PostgreSQL database dump"));
    }

    #[test]
    fn compress_missing_directory_fails_without_archive() {
        let dir = tempfile::tempdir().unwrap();
        let ghost = dir.path().join("backup-29990101-000000");
        let err = compress(&ghost).unwrap_err();
        assert!(matches!(err, BackupError::Compression(_)));
        assert!(!archive_path_for(&ghost).exists());
    }
}
