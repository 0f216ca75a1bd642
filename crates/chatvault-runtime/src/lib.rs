//! chatvault-runtime — thin gateway over the container orchestrator.
//!
//! Every other component talks to the running stack through the
//! [`ServiceRuntime`] trait: start/stop/scale named services, stream
//! logs, report per-service state, execute commands inside containers.
//! The production implementation shells out to `docker compose`;
//! consumers inject fakes in tests.

pub mod compose;
pub mod error;

pub use compose::{ComposeRuntime, ExecOutput, UpOptions};
pub use error::{RuntimeError, RuntimeResult};

use async_trait::async_trait;

/// Operations the orchestrator needs from the container runtime.
#[async_trait]
pub trait ServiceRuntime: Send + Sync {
    /// Pull current images for all services.
    async fn pull(&self) -> RuntimeResult<()>;

    /// Bring services up (all services when `services` is empty).
    async fn up(&self, services: &[&str], opts: UpOptions) -> RuntimeResult<()>;

    /// Stop and remove all services within `timeout_secs`.
    async fn down(&self, timeout_secs: u64) -> RuntimeResult<()>;

    /// Whether the named service has a running container.
    async fn ps(&self, service: &str) -> RuntimeResult<bool>;

    /// Run a command inside the named service's container.
    async fn exec(&self, service: &str, command: &[&str]) -> RuntimeResult<ExecOutput>;

    /// Run a command inside a container, feeding `input` on stdin.
    async fn exec_with_input(
        &self,
        service: &str,
        command: &[&str],
        input: &str,
    ) -> RuntimeResult<ExecOutput>;

    /// Tail of the named service's logs.
    async fn logs(&self, service: &str, tail: u32) -> RuntimeResult<String>;

    /// Remove dangling images, stopped containers, and unused networks.
    async fn prune_dangling(&self) -> RuntimeResult<()>;
}
