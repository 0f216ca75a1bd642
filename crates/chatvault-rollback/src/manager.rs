//! Rollback sequencing — resolve, verify, snapshot, restore, re-verify.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tracing::{info, warn};
use walkdir::WalkDir;

use chatvault_backup::{archive, list_sets, verify, BackupSet, VerificationStatus};
use chatvault_core::poll::{poll_until, PollOutcome, PollSpec};
use chatvault_core::{pointer, Confirm, Environment, OpsConfig};
use chatvault_health::probe;
use chatvault_runtime::{ServiceRuntime, UpOptions};

use crate::error::{RollbackError, RollbackResult};

/// Options for one restore run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Skip the interactive confirmation gate.
    pub force: bool,
    /// Log the plan without touching the system.
    pub dry_run: bool,
}

/// Restores the stack from a backup set.
pub struct RollbackManager<'a> {
    config: &'a OpsConfig,
    runtime: &'a dyn ServiceRuntime,
    confirm: &'a dyn Confirm,
    environment: Environment,
}

impl<'a> RollbackManager<'a> {
    pub fn new(
        config: &'a OpsConfig,
        runtime: &'a dyn ServiceRuntime,
        confirm: &'a dyn Confirm,
        environment: Environment,
    ) -> Self {
        Self {
            config,
            runtime,
            confirm,
            environment,
        }
    }

    /// Restore from `target`, or from the newest set when `target` is None.
    pub async fn restore(
        &self,
        target: Option<&Path>,
        opts: &RestoreOptions,
    ) -> RollbackResult<()> {
        let set = self.resolve(target)?;
        info!(set = %set.path.display(), "rollback target resolved");

        if verify(&set) != VerificationStatus::Valid {
            return Err(RollbackError::NotVerified(set.path.display().to_string()));
        }

        // Archived sets are unpacked to a scratch dir and restored from there.
        let _scratch;
        let set_dir = if set.compressed {
            let scratch = tempfile::tempdir()?;
            let extracted = archive::extract(&set.path, scratch.path())?;
            _scratch = scratch;
            extracted
        } else {
            set.path.clone()
        };

        let config_src = set_dir.join("config");
        if !config_src.join("docker-compose.yml").exists() {
            return Err(RollbackError::MissingRequired(
                "config/docker-compose.yml".to_string(),
            ));
        }
        if !config_src.join(".env").exists() {
            warn!("backup set has no .env file; live environment file will be kept");
        }
        let dump_path = set_dir.join("database.sql");
        if !dump_path.exists() {
            warn!("backup set has no database dump; only configuration will be restored");
        }

        if opts.dry_run {
            info!(
                set = %set.path.display(),
                database = dump_path.exists(),
                "dry run: would stop services, restore configuration, and restart"
            );
            return Ok(());
        }

        if !opts.force {
            let prompt = format!(
                "Restore {} from {}? This overwrites live configuration{}",
                self.environment,
                set.path.display(),
                if dump_path.exists() {
                    " and replaces the database"
                } else {
                    ""
                }
            );
            if !self.confirm.confirm(&prompt) {
                return Err(RollbackError::Declined);
            }
        }

        self.safety_snapshot()?;

        info!("stopping all services");
        self.runtime
            .down(self.config.timing.shutdown_timeout_secs)
            .await?;

        info!("restoring configuration files");
        self.restore_config(&config_src)?;

        if dump_path.exists() {
            self.restore_database(&dump_path).await?;
        }

        info!("starting all services");
        self.runtime.up(&[], UpOptions::default()).await?;

        self.await_liveness().await;
        info!("rollback complete");
        Ok(())
    }

    /// Pick the explicit target, or the newest set by name ordering.
    fn resolve(&self, target: Option<&Path>) -> RollbackResult<BackupSet> {
        if let Some(path) = target {
            return BackupSet::from_path(path)
                .ok_or_else(|| RollbackError::NoBackups(path.display().to_string()));
        }
        let dir = self.config.resolve(&self.config.backup_dir);
        let sets = list_sets(&dir)?;
        sets.into_iter()
            .next_back()
            .ok_or_else(|| RollbackError::NoBackups(dir.display().to_string()))
    }

    /// Copy the live configuration aside before overwriting it.
    fn safety_snapshot(&self) -> RollbackResult<()> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let snapshot_dir = self
            .config
            .resolve(&self.config.state_dir)
            .join("safety")
            .join(&stamp);
        std::fs::create_dir_all(&snapshot_dir)?;

        let root = &self.config.project_root;
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if name_str.starts_with(".env")
                || (name_str.starts_with("docker-compose") && name_str.ends_with(".yml"))
            {
                std::fs::copy(entry.path(), snapshot_dir.join(name_str.as_ref()))?;
            }
        }
        for dir_name in ["nginx", "monitoring"] {
            let src = root.join(dir_name);
            if src.is_dir() {
                copy_tree(&src, &snapshot_dir.join(dir_name))?;
            }
        }

        pointer::write_pointer(&self.config.last_safety_pointer(), &snapshot_dir)?;
        info!(snapshot = %snapshot_dir.display(), "safety snapshot of live configuration taken");
        Ok(())
    }

    /// Copy captured configuration back over the live tree.
    fn restore_config(&self, config_src: &Path) -> RollbackResult<()> {
        let root = &self.config.project_root;
        for entry in std::fs::read_dir(config_src)? {
            let entry = entry?;
            let name = entry.file_name();
            if entry.file_type()?.is_file() {
                std::fs::copy(entry.path(), root.join(&name))?;
            } else if entry.file_type()?.is_dir() {
                copy_tree(&entry.path(), &root.join(&name))?;
            }
        }
        Ok(())
    }

    /// Bring up the datastore alone, wait for readiness, replay the dump.
    async fn restore_database(&self, dump_path: &Path) -> RollbackResult<()> {
        let service = self.config.services.postgres.as_str();
        let db = &self.config.database;

        info!("starting datastore for restore");
        self.runtime.up(&[service], UpOptions::default()).await?;

        let spec = PollSpec::new(
            self.config.timing.poll_attempts,
            Duration::from_secs(self.config.timing.poll_interval_secs),
        );
        let runtime = self.runtime;
        let (user, name) = (db.user.as_str(), db.name.as_str());
        let ready = poll_until("datastore readiness", spec, || async move {
            runtime
                .exec(service, &["pg_isready", "-U", user, "-d", name])
                .await
                .is_ok()
        })
        .await;
        if let PollOutcome::Exhausted { attempts } = ready {
            return Err(RollbackError::DatastoreNotReady { attempts });
        }

        info!(dump = %dump_path.display(), "replaying database dump");
        let dump = std::fs::read_to_string(dump_path)?;
        self.runtime
            .exec_with_input(
                service,
                &["psql", "-U", &db.user, "-d", &db.name, "-v", "ON_ERROR_STOP=1"],
                &dump,
            )
            .await?;
        Ok(())
    }

    /// Poll the liveness endpoint; exhaustion is tolerated with a warning.
    async fn await_liveness(&self) {
        let base_url = &self.config.environment(self.environment).base_url;
        let Some(target) = probe::parse_base_url(base_url) else {
            warn!(%base_url, "cannot parse base URL, skipping liveness wait");
            return;
        };
        let spec = PollSpec::new(
            self.config.timing.poll_attempts,
            Duration::from_secs(self.config.timing.poll_interval_secs),
        );
        let outcome = poll_until("liveness after rollback", spec, || {
            let target = target.clone();
            async move {
                probe::http_get(&target, "/health", Duration::from_secs(2))
                    .await
                    .map(|r| r.status == 200)
                    .unwrap_or(false)
            }
        })
        .await;
        match outcome {
            PollOutcome::Satisfied { attempts } => {
                info!(attempts, "liveness endpoint responding");
            }
            PollOutcome::Exhausted { .. } => {
                warn!("liveness endpoint not responding yet; the system may still be starting");
            }
        }
    }
}

/// Recursive copy, overwriting existing files.
fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
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
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
