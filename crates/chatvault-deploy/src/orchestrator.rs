//! Deployment orchestrator — drives the deployment state machine.
//!
//! `Pending → BackingUp → Deploying → Migrating → HealthChecking →
//! Success`, with a failure edge from Migrating/HealthChecking through
//! `RollingBack` to `RolledBack` or `Failed`. A runtime-command failure
//! during Deploying aborts the run without rollback; only migration and
//! health-gate failures route to the rollback manager.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use chatvault_backup::{retention, BackupManager, BackupOptions, BackupScope};
use chatvault_core::{pointer, Environment, OpsConfig};
use chatvault_health::{HealthEngine, RequestedChecks, Severity};
use chatvault_rollback::{RestoreOptions, RollbackManager};
use chatvault_runtime::{ServiceRuntime, UpOptions};

use crate::error::{DeployError, DeployResult};
use crate::strategy::{Strategy, BLUE_GREEN_SCALE};

/// Pre-deploy backups the orchestrator keeps for itself.
const PRE_DEPLOY_KEEP: usize = 5;

/// Options for one deployment run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    pub strategy: Strategy,
    /// Skip the pre-deploy backup; rollback on failure becomes a no-op.
    pub skip_backup: bool,
    /// Skip the post-deploy health gate.
    pub skip_health: bool,
}

/// Phase of the deployment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Pending,
    BackingUp,
    Deploying,
    Migrating,
    HealthChecking,
    Success,
    RollingBack,
    RolledBack,
    Failed,
}

/// One invocation of the orchestrator.
#[derive(Debug, Clone)]
pub struct DeploymentRun {
    pub environment: Environment,
    pub strategy: Strategy,
    pub phase: DeployPhase,
    /// The backup taken at the start of this run — the rollback target.
    pub backup_ref: Option<PathBuf>,
    pub failure: Option<String>,
}

impl DeploymentRun {
    fn new(environment: Environment, strategy: Strategy) -> Self {
        Self {
            environment,
            strategy,
            phase: DeployPhase::Pending,
            backup_ref: None,
            failure: None,
        }
    }

    fn transition(&mut self, next: DeployPhase) {
        info!(from = ?self.phase, to = ?next, "deployment phase");
        self.phase = next;
    }

    fn fail(&mut self, reason: String) {
        error!(%reason, "deployment failed");
        self.transition(DeployPhase::Failed);
        self.failure = Some(reason);
    }

    pub fn succeeded(&self) -> bool {
        self.phase == DeployPhase::Success
    }
}

/// Aggregated health verdict used to gate a deployment.
#[async_trait]
pub trait HealthGate: Send + Sync {
    async fn aggregate(&self, base_url: &str) -> Severity;
}

/// Restores the system from a backup set during automatic rollback.
#[async_trait]
pub trait Restorer: Send + Sync {
    async fn restore(&self, backup: &Path) -> Result<(), String>;
}

/// Production health gate backed by the full health engine.
pub struct EngineGate<'a> {
    config: &'a OpsConfig,
    runtime: &'a dyn ServiceRuntime,
    timeout: Duration,
}

impl<'a> EngineGate<'a> {
    pub fn new(config: &'a OpsConfig, runtime: &'a dyn ServiceRuntime, timeout: Duration) -> Self {
        Self {
            config,
            runtime,
            timeout,
        }
    }
}

#[async_trait]
impl HealthGate for EngineGate<'_> {
    async fn aggregate(&self, base_url: &str) -> Severity {
        HealthEngine::new(self.config, self.runtime)
            .evaluate(base_url, self.timeout, &RequestedChecks::default())
            .await
            .overall
    }
}

/// Production restorer backed by the rollback manager.
///
/// Automatic rollback never prompts: a run that reaches this point has
/// already failed and the operator opted into automatic recovery.
pub struct ManagerRestorer<'a> {
    manager: RollbackManager<'a>,
}

impl<'a> ManagerRestorer<'a> {
    pub fn new(manager: RollbackManager<'a>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Restorer for ManagerRestorer<'_> {
    async fn restore(&self, backup: &Path) -> Result<(), String> {
        self.manager
            .restore(
                Some(backup),
                &RestoreOptions {
                    force: true,
                    dry_run: false,
                },
            )
            .await
            .map_err(|e| e.to_string())
    }
}

/// Executes deployment runs.
pub struct Orchestrator<'a> {
    config: &'a OpsConfig,
    runtime: &'a dyn ServiceRuntime,
    health: &'a dyn HealthGate,
    restorer: &'a dyn Restorer,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        config: &'a OpsConfig,
        runtime: &'a dyn ServiceRuntime,
        health: &'a dyn HealthGate,
        restorer: &'a dyn Restorer,
    ) -> Self {
        Self {
            config,
            runtime,
            health,
            restorer,
        }
    }

    /// Run one deployment. Precondition checks (`preflight::check_all`)
    /// must have passed before this is called.
    pub async fn run(&self, env: Environment, opts: &DeployOptions) -> DeployResult<DeploymentRun> {
        let mut run = DeploymentRun::new(env, opts.strategy);
        info!(environment = %env, strategy = %opts.strategy, "deployment starting");

        run.transition(DeployPhase::BackingUp);
        if opts.skip_backup {
            warn!("pre-deploy backup skipped; rollback on failure will be a no-op");
        } else {
            let manager = BackupManager::new(self.config, self.runtime);
            let backup_opts = BackupOptions {
                destination: self.pre_deploy_dir(),
                compress: false,
                dry_run: false,
            };
            match manager.create(BackupScope::pre_deploy(), &backup_opts).await {
                Ok(set) => {
                    pointer::write_pointer(&self.config.last_backup_pointer(), &set.path)?;
                    info!(backup = %set.path.display(), "pre-deploy backup recorded");
                    run.backup_ref = Some(set.path);
                }
                Err(e) => {
                    run.fail(format!("pre-deploy backup failed: {e}"));
                    return Ok(run);
                }
            }
        }

        run.transition(DeployPhase::Deploying);
        if let Err(e) = self.execute_strategy(opts.strategy, env).await {
            // The system is presumed not yet changed enough to need a
            // rollback here; surface the failure and stop.
            run.fail(format!("strategy execution failed: {e}"));
            return Ok(run);
        }

        run.transition(DeployPhase::Migrating);
        self.settle().await;
        let migration: Vec<&str> = self
            .config
            .migration_command
            .iter()
            .map(|s| s.as_str())
            .collect();
        if let Err(e) = self
            .runtime
            .exec(&self.config.services.api, &migration)
            .await
        {
            return Ok(self.roll_back(run, format!("migration failed: {e}")).await);
        }

        run.transition(DeployPhase::HealthChecking);
        if opts.skip_health {
            warn!("post-deploy health gate skipped");
        } else {
            let base_url = &self.config.environment(env).base_url;
            match self.health.aggregate(base_url).await {
                Severity::Critical => {
                    return Ok(self
                        .roll_back(run, "health gate reported critical".to_string())
                        .await);
                }
                Severity::Warning => {
                    warn!("health gate reported warnings; deployment continues");
                }
                Severity::Ok => {}
            }
        }

        run.transition(DeployPhase::Success);
        self.cleanup().await;
        info!(environment = %env, "deployment succeeded");
        Ok(run)
    }

    async fn execute_strategy(&self, strategy: Strategy, env: Environment) -> DeployResult<()> {
        let services = &self.config.services;
        match strategy {
            Strategy::Rolling => {
                self.runtime.pull().await?;
                self.runtime
                    .up(
                        &[services.api.as_str(), services.worker.as_str()],
                        UpOptions {
                            no_deps: true,
                            remove_orphans: true,
                            ..Default::default()
                        },
                    )
                    .await?;
                self.settle().await;
                // Reconcile the remaining services to the target state.
                self.runtime.up(&[], UpOptions::default()).await?;
            }
            Strategy::BlueGreen => {
                self.runtime.pull().await?;
                // Green capacity alongside blue: scale without recreating
                // the existing instances.
                self.runtime
                    .up(
                        &[],
                        UpOptions {
                            no_recreate: true,
                            scale: vec![
                                (services.api.clone(), BLUE_GREEN_SCALE),
                                (services.worker.clone(), BLUE_GREEN_SCALE),
                            ],
                            ..Default::default()
                        },
                    )
                    .await?;
                self.settle().await;

                let base_url = &self.config.environment(env).base_url;
                if self.health.aggregate(base_url).await == Severity::Critical {
                    warn!("green capacity unhealthy; aborting before retiring blue instances");
                    return Err(DeployError::BlueGreenUnhealthy);
                }
                // Healthy: reconcile to the target state, retiring blue.
                self.runtime.up(&[], UpOptions::default()).await?;
            }
            Strategy::Recreate => {
                self.runtime
                    .down(self.config.timing.shutdown_timeout_secs)
                    .await?;
                self.runtime.pull().await?;
                self.runtime.up(&[], UpOptions::default()).await?;
            }
        }
        Ok(())
    }

    async fn roll_back(&self, mut run: DeploymentRun, cause: String) -> DeploymentRun {
        error!(%cause, "deployment failed, rolling back");
        run.transition(DeployPhase::RollingBack);
        match run.backup_ref.clone() {
            None => {
                warn!("no backup reference recorded for this run; rollback is a no-op");
                run.transition(DeployPhase::Failed);
                run.failure = Some(format!("{cause}; no backup to roll back to"));
            }
            Some(backup) => match self.restorer.restore(&backup).await {
                Ok(()) => {
                    info!(backup = %backup.display(), "rolled back to pre-deploy backup");
                    run.transition(DeployPhase::RolledBack);
                    run.failure = Some(cause);
                }
                Err(e) => {
                    error!(error = %e, "rollback failed; manual intervention required");
                    run.transition(DeployPhase::Failed);
                    run.failure = Some(format!("{cause}; rollback failed: {e}"));
                }
            },
        }
        run
    }

    /// Post-success cleanup. Never fails the run.
    async fn cleanup(&self) {
        if let Err(e) = self.runtime.prune_dangling().await {
            warn!(error = %e, "post-deploy prune failed");
        }
        if let Err(e) = retention::retain_newest(&self.pre_deploy_dir(), PRE_DEPLOY_KEEP) {
            warn!(error = %e, "could not trim pre-deploy backups");
        }
    }

    fn pre_deploy_dir(&self) -> PathBuf {
        self.config.resolve(&self.config.backup_dir).join("pre-deploy")
    }

    async fn settle(&self) {
        let secs = self.config.timing.settle_secs;
        if secs > 0 {
            info!(secs, "waiting for services to settle");
            tokio::time::sleep(Duration::from_secs(secs)).await;
        }
    }
}
