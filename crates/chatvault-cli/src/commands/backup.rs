//! `chatvault backup` — create a backup set, then apply retention.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use chatvault_backup::{retention, BackupManager, BackupOptions, BackupScope};
use chatvault_core::{Environment, OpsConfig};
use chatvault_runtime::ComposeRuntime;

pub struct BackupArgs {
    pub output_dir: Option<PathBuf>,
    pub compress: bool,
    pub retention_days: i64,
    pub db_only: bool,
    pub config_only: bool,
    pub media_only: bool,
    pub exclude_media: bool,
    pub dry_run: bool,
    pub environment: String,
}

pub async fn run(config: &OpsConfig, args: BackupArgs) -> anyhow::Result<i32> {
    let environment: Environment = args.environment.parse()?;
    let scope = BackupScope::from_flags(
        args.db_only,
        args.config_only,
        args.media_only,
        args.exclude_media,
    );

    let destination = args
        .output_dir
        .unwrap_or_else(|| config.resolve(&config.backup_dir));

    let runtime = ComposeRuntime::new(config, environment);
    let manager = BackupManager::new(config, &runtime);
    let set = manager
        .create(
            scope,
            &BackupOptions {
                destination: destination.clone(),
                compress: args.compress,
                dry_run: args.dry_run,
            },
        )
        .await
        .context("backup failed")?;

    if !args.dry_run {
        info!(
            set = %set.path.display(),
            bytes = set.size,
            status = ?set.verification,
            "backup set created"
        );
        let removed = retention::prune(&destination, args.retention_days)?;
        if removed > 0 {
            info!(removed, retention_days = args.retention_days, "expired sets pruned");
        }
    }
    Ok(0)
}
