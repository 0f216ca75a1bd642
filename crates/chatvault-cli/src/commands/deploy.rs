//! `chatvault deploy` — preflight, then run the deployment state machine.

use std::time::Duration;

use tracing::{error, info};

use chatvault_core::{AlwaysConfirm, Environment, OpsConfig};
use chatvault_deploy::orchestrator::{EngineGate, ManagerRestorer};
use chatvault_deploy::{preflight, DeployOptions, Orchestrator, Strategy};
use chatvault_rollback::RollbackManager;
use chatvault_runtime::ComposeRuntime;

/// Per-probe timeout for the deploy health gate.
const GATE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DeployArgs {
    pub environment: String,
    pub strategy: String,
    pub force: bool,
    pub skip_backup: bool,
    pub skip_health: bool,
}

pub async fn run(config: &OpsConfig, args: DeployArgs) -> anyhow::Result<i32> {
    let environment: Environment = args.environment.parse()?;
    let strategy: Strategy = args.strategy.parse()?;

    // A failed precondition is fatal before any state change.
    preflight::check_all(config, environment, args.force).await?;

    let runtime = ComposeRuntime::new(config, environment);
    let gate = EngineGate::new(config, &runtime, GATE_TIMEOUT);
    let restorer = ManagerRestorer::new(RollbackManager::new(
        config,
        &runtime,
        &AlwaysConfirm,
        environment,
    ));
    let orchestrator = Orchestrator::new(config, &runtime, &gate, &restorer);

    let run = orchestrator
        .run(
            environment,
            &DeployOptions {
                strategy,
                skip_backup: args.skip_backup,
                skip_health: args.skip_health,
            },
        )
        .await?;

    if run.succeeded() {
        info!(environment = %environment, strategy = %strategy, "deployment succeeded");
        Ok(0)
    } else {
        error!(
            phase = ?run.phase,
            failure = run.failure.as_deref().unwrap_or("unknown"),
            "deployment did not succeed"
        );
        Ok(1)
    }
}
