//! Atomic pointer files.
//!
//! A pointer file records a single path (the last pre-deploy backup, the
//! last safety snapshot). Writes go to a temp file in the same directory
//! followed by a rename, so a crash never leaves a partial pointer.

use std::io;
use std::path::{Path, PathBuf};

/// Atomically overwrite `pointer` with `target`.
pub fn write_pointer(pointer: &Path, target: &Path) -> io::Result<()> {
    let parent = pointer
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "pointer has no parent"))?;
    std::fs::create_dir_all(parent)?;

    let tmp = pointer.with_extension("tmp");
    std::fs::write(&tmp, format!("{}\n", target.display()))?;
    std::fs::rename(&tmp, pointer)?;
    Ok(())
}

/// Read a pointer file, if it exists.
pub fn read_pointer(pointer: &Path) -> io::Result<Option<PathBuf>> {
    match std::fs::read_to_string(pointer) {
        Ok(content) => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(PathBuf::from(trimmed)))
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
