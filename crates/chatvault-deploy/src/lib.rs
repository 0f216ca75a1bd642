//! chatvault-deploy — strategy-driven deployment with automatic rollback.
//!
//! Drives the deployment state machine: pre-deploy backup, strategy
//! execution against the runtime gateway, the migration step, and the
//! health gate. A migration or health-gate failure routes to the
//! rollback manager with the backup taken in the same run.

pub mod error;
pub mod orchestrator;
pub mod preflight;
pub mod strategy;

pub use error::{DeployError, DeployResult};
pub use orchestrator::{
    DeployOptions, DeployPhase, DeploymentRun, HealthGate, Orchestrator, Restorer,
};
pub use strategy::Strategy;
