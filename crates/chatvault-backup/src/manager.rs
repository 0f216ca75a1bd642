//! Backup creation — database dump, config, media, and log capture.

use std::path::{Path, PathBuf};

use chrono::Local;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use chatvault_core::OpsConfig;
use chatvault_runtime::ServiceRuntime;

use crate::archive;
use crate::error::{BackupError, BackupResult};
use crate::scope::BackupScope;
use crate::set::{dir_size, verify, BackupSet, Manifest, VerificationStatus};

/// Log files older than this are not captured.
const LOG_WINDOW_DAYS: u64 = 7;

/// Lines of container logs captured per service.
const CONTAINER_LOG_TAIL: u32 = 1000;

/// Options for one backup run.
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Directory the set is created under.
    pub destination: PathBuf,
    /// Pack the finished set into a tar.gz archive.
    pub compress: bool,
    /// Log the plan without touching the filesystem.
    pub dry_run: bool,
}

/// Creates backup sets from the live system.
pub struct BackupManager<'a> {
    config: &'a OpsConfig,
    runtime: &'a dyn ServiceRuntime,
}

impl<'a> BackupManager<'a> {
    pub fn new(config: &'a OpsConfig, runtime: &'a dyn ServiceRuntime) -> Self {
        Self { config, runtime }
    }

    /// Capture a new backup set.
    ///
    /// Steps run independently: a failing step is recorded and the
    /// remaining steps still execute, but any recorded failure makes the
    /// whole run an error. An unreachable datastore is only a warning
    /// unless the scope is restricted to the database.
    pub async fn create(&self, scope: BackupScope, opts: &BackupOptions) -> BackupResult<BackupSet> {
        let id = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let set_dir = opts.destination.join(format!("backup-{id}"));

        if opts.dry_run {
            info!(
                set = %set_dir.display(),
                components = ?scope.components(),
                compress = opts.compress,
                "dry run: would create backup set"
            );
            return Ok(BackupSet {
                id,
                path: set_dir,
                compressed: false,
                size: 0,
                verification: VerificationStatus::Unverified,
            });
        }

        std::fs::create_dir_all(&set_dir)?;
        info!(set = %set_dir.display(), components = ?scope.components(), "creating backup set");

        let mut failures: Vec<String> = Vec::new();
        let mut manifest = Manifest {
            id: id.clone(),
            created_at: Local::now().to_rfc3339(),
            components: scope,
            media_files: 0,
            media_bytes: 0,
            database_sha256: None,
        };

        if scope.database {
            match self.dump_database(&set_dir).await {
                Ok(sha) => manifest.database_sha256 = Some(sha),
                Err(BackupError::Runtime(e)) => {
                    if scope.is_database_only() {
                        return Err(BackupError::DatabaseOnly(e.to_string()));
                    }
                    warn!(error = %e, "datastore unreachable, skipping database dump");
                    manifest.components.database = false;
                }
                Err(e) => failures.push(format!("database: {e}")),
            }
        }

        if scope.config {
            if let Err(e) = self.copy_config(&set_dir) {
                failures.push(format!("config: {e}"));
            }
        }

        if scope.media {
            match self.copy_media(&set_dir) {
                Ok(Some((files, bytes))) => {
                    manifest.media_files = files;
                    manifest.media_bytes = bytes;
                }
                Ok(None) => debug!("media directory empty or absent, skipped"),
                Err(e) => failures.push(format!("media: {e}")),
            }
        }

        if scope.logs {
            if let Err(e) = self.copy_logs(&set_dir).await {
                failures.push(format!("logs: {e}"));
            }
        }

        let manifest_json = serde_json::to_string_pretty(&manifest)?;
        std::fs::write(set_dir.join("manifest.json"), manifest_json)?;

        if !failures.is_empty() {
            return Err(BackupError::StepsFailed(failures.join("; ")));
        }

        let mut set = BackupSet {
            id,
            path: set_dir,
            compressed: false,
            size: 0,
            verification: VerificationStatus::Unverified,
        };

        if opts.compress {
            set.path = archive::compress(&set.path)?;
            set.compressed = true;
            set.size = std::fs::metadata(&set.path)?.len();
        } else {
            set.size = dir_size(&set.path);
        }

        set.verification = verify(&set);
        if set.verification == VerificationStatus::Corrupt {
            return Err(BackupError::Corrupt(set.path.display().to_string()));
        }

        info!(set = %set.path.display(), bytes = set.size, "backup set complete");
        Ok(set)
    }

    /// Export the primary datastore through its native dump tool.
    async fn dump_database(&self, set_dir: &Path) -> BackupResult<String> {
        let db = &self.config.database;
        let output = self
            .runtime
            .exec(
                &self.config.services.postgres,
                &["pg_dump", "-U", &db.user, "--no-owner", &db.name],
            )
            .await?;

        let dump_path = set_dir.join("database.sql");
        std::fs::write(&dump_path, output.stdout.as_bytes())?;

        let mut hasher = Sha256::new();
        hasher.update(output.stdout.as_bytes());
        let sha = hex::encode(hasher.finalize());
        debug!(dump = %dump_path.display(), sha256 = %sha, "database dumped");
        Ok(sha)
    }

    /// Copy configuration files and directories, byte-identical.
    fn copy_config(&self, set_dir: &Path) -> BackupResult<()> {
        let config_dir = set_dir.join("config");
        std::fs::create_dir_all(&config_dir)?;

        let root = &self.config.project_root;
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let wanted = name.starts_with(".env")
                || (name.starts_with("docker-compose") && name.ends_with(".yml"));
            if wanted {
                std::fs::copy(entry.path(), config_dir.join(name.as_ref()))?;
            }
        }

        for dir_name in ["nginx", "monitoring"] {
            let src = root.join(dir_name);
            if src.is_dir() {
                copy_tree(&src, &config_dir.join(dir_name))?;
            }
        }
        Ok(())
    }

    /// Copy non-empty media directories, recording file count and bytes.
    fn copy_media(&self, set_dir: &Path) -> BackupResult<Option<(u64, u64)>> {
        let src = self.config.resolve(&self.config.media_dir);
        if !src.is_dir() {
            return Ok(None);
        }
        let (files, bytes) = copy_tree(&src, &set_dir.join("media"))?;
        if files == 0 {
            // Nothing was there; drop the empty directory again.
            let _ = std::fs::remove_dir_all(set_dir.join("media"));
            return Ok(None);
        }
        Ok(Some((files, bytes)))
    }

    /// Copy recent log files plus a bounded tail of each container's logs.
    async fn copy_logs(&self, set_dir: &Path) -> BackupResult<()> {
        let logs_dir = set_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)?;

        let src = self.config.resolve(&self.config.log_dir);
        if src.is_dir() {
            let cutoff = std::time::SystemTime::now()
                - std::time::Duration::from_secs(LOG_WINDOW_DAYS * 24 * 60 * 60);
            for entry in std::fs::read_dir(&src)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let recent = entry
                    .metadata()?
                    .modified()
                    .map(|mtime| mtime >= cutoff)
                    .unwrap_or(false);
                if recent {
                    std::fs::copy(entry.path(), logs_dir.join(entry.file_name()))?;
                }
            }
        }

        let container_dir = logs_dir.join("containers");
        std::fs::create_dir_all(&container_dir)?;
        for service in self.config.services.all() {
            match self.runtime.logs(service, CONTAINER_LOG_TAIL).await {
                Ok(text) => {
                    std::fs::write(container_dir.join(format!("{service}.log")), text)?;
                }
                Err(e) => {
                    warn!(service, error = %e, "could not capture container logs");
                }
            }
        }
        Ok(())
    }
}

/// Recursive copy; returns (file count, total bytes).
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<(u64, u64)> {
    let mut files = 0u64;
    let mut bytes = 0u64;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(std::io::Error::other)?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            bytes += std::fs::copy(entry.path(), &target)?;
            files += 1;
        }
    }
    Ok((files, bytes))
}
