//! `chatvault rollback` — restore from a backup set, or list sets.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use chatvault_backup::{list_sets, verify};
use chatvault_core::{AlwaysConfirm, Confirm, Environment, OpsConfig, StdinConfirm};
use chatvault_rollback::{RestoreOptions, RollbackManager};
use chatvault_runtime::ComposeRuntime;

pub struct RollbackArgs {
    pub backup_dir: Option<PathBuf>,
    pub list_backups: bool,
    pub force: bool,
    pub dry_run: bool,
    pub environment: String,
}

pub async fn run(config: &OpsConfig, args: RollbackArgs) -> anyhow::Result<i32> {
    let environment: Environment = args.environment.parse()?;

    if args.list_backups {
        return list_available(config);
    }

    let runtime = ComposeRuntime::new(config, environment);
    let confirm: Box<dyn Confirm> = if args.force || args.dry_run {
        Box::new(AlwaysConfirm)
    } else {
        Box::new(StdinConfirm)
    };
    let manager = RollbackManager::new(config, &runtime, confirm.as_ref(), environment);

    manager
        .restore(
            args.backup_dir.as_deref(),
            &RestoreOptions {
                force: args.force,
                dry_run: args.dry_run,
            },
        )
        .await
        .context("rollback failed")?;

    if !args.dry_run {
        info!(environment = %environment, "rollback complete");
    }
    Ok(0)
}

fn list_available(config: &OpsConfig) -> anyhow::Result<i32> {
    let dir = config.resolve(&config.backup_dir);
    let sets = list_sets(&dir)?;
    if sets.is_empty() {
        println!("no backup sets in {}", dir.display());
        return Ok(0);
    }

    println!("backup sets in {} (oldest first):", dir.display());
    for set in sets {
        let status = verify(&set);
        println!(
            "  {}  {:>10}  {:<9}  {:?}",
            set.id,
            human_size(set.size),
            if set.compressed { "archive" } else { "directory" },
            status,
        );
    }
    Ok(0)
}

fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
