//! chatvault — release lifecycle tooling for the chat-archive stack.
//!
//! Four operations: `backup` (point-in-time backup sets), `deploy`
//! (strategy-driven rollout with automatic rollback), `health`
//! (aggregated stack health with monitoring exit codes), and `rollback`
//! (restore from a backup set).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

mod commands;

/// Exit code used when the active phase is abandoned on Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "chatvault",
    about = "Release lifecycle tooling for the chat-archive stack",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "chatvault.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a backup set of the selected components.
    Backup {
        /// Directory the set is created under (default: configured backup dir).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Pack the finished set into a single tar.gz archive.
        #[arg(short, long)]
        compress: bool,
        /// Delete sets older than this many days; 0 or less disables pruning.
        #[arg(long, default_value_t = 30)]
        retention_days: i64,
        /// Back up the database only.
        #[arg(long)]
        db_only: bool,
        /// Back up configuration files only.
        #[arg(long)]
        config_only: bool,
        /// Back up media only.
        #[arg(long)]
        media_only: bool,
        /// Leave media out of the backup.
        #[arg(long)]
        exclude_media: bool,
        /// Log the plan without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Environment whose runtime is captured.
        #[arg(long, default_value = "staging")]
        environment: String,
    },

    /// Deploy a new version under a rollout strategy.
    Deploy {
        /// Target environment: staging or production.
        environment: String,
        /// Rollout strategy: rolling, blue-green, or recreate.
        #[arg(default_value = "rolling")]
        strategy: String,
        /// Deploy even with uncommitted local changes.
        #[arg(short, long)]
        force: bool,
        /// Skip the pre-deploy backup (rollback on failure becomes a no-op).
        #[arg(long)]
        skip_backup: bool,
        /// Skip the post-deploy health gate.
        #[arg(long)]
        skip_health: bool,
    },

    /// Evaluate the health of the running stack.
    Health {
        /// Base URL to probe (default: the environment's configured URL).
        #[arg(long)]
        url: Option<String>,
        /// Per-probe timeout in seconds.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
        /// Output format: plain, monitoring, or json.
        #[arg(long, default_value = "plain")]
        format: String,
        /// Environment whose stack is probed.
        #[arg(long, default_value = "staging")]
        environment: String,
    },

    /// Restore configuration and database from a backup set.
    Rollback {
        /// Backup set to restore (default: the newest set).
        backup_dir: Option<PathBuf>,
        /// List available backup sets and exit.
        #[arg(long)]
        list_backups: bool,
        /// Skip the interactive confirmation.
        #[arg(short, long)]
        force: bool,
        /// Log the plan without touching the system.
        #[arg(long)]
        dry_run: bool,
        /// Environment whose stack is restored.
        #[arg(long, default_value = "staging")]
        environment: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.parse().expect("static filter parses")),
        )
        .with_target(false)
        .init();

    let code = tokio::select! {
        code = dispatch(cli) => code,
        _ = tokio::signal::ctrl_c() => {
            error!("interrupted; active phase abandoned, inspect the system before retrying");
            EXIT_INTERRUPTED
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> i32 {
    let config = match chatvault_core::OpsConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };

    let result = match cli.command {
        Commands::Backup {
            output_dir,
            compress,
            retention_days,
            db_only,
            config_only,
            media_only,
            exclude_media,
            dry_run,
            environment,
        } => {
            commands::backup::run(
                &config,
                commands::backup::BackupArgs {
                    output_dir,
                    compress,
                    retention_days,
                    db_only,
                    config_only,
                    media_only,
                    exclude_media,
                    dry_run,
                    environment,
                },
            )
            .await
        }
        Commands::Deploy {
            environment,
            strategy,
            force,
            skip_backup,
            skip_health,
        } => {
            commands::deploy::run(
                &config,
                commands::deploy::DeployArgs {
                    environment,
                    strategy,
                    force,
                    skip_backup,
                    skip_health,
                },
            )
            .await
        }
        Commands::Health {
            url,
            timeout,
            format,
            environment,
        } => {
            commands::health::run(
                &config,
                commands::health::HealthArgs {
                    url,
                    timeout,
                    format,
                    environment,
                },
            )
            .await
        }
        Commands::Rollback {
            backup_dir,
            list_backups,
            force,
            dry_run,
            environment,
        } => {
            commands::rollback::run(
                &config,
                commands::rollback::RollbackArgs {
                    backup_dir,
                    list_backups,
                    force,
                    dry_run,
                    environment,
                },
            )
            .await
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            1
        }
    }
}
