//! `docker compose` gateway implementation.
//!
//! Commands are assembled by pure helpers (unit-tested without spawning)
//! and executed with `tokio::process::Command`, working directory pinned
//! to the project root so no component ever has to chdir.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use chatvault_core::{Environment, OpsConfig};

use crate::error::{RuntimeError, RuntimeResult};
use crate::ServiceRuntime;

/// Options for `compose up`.
#[derive(Debug, Clone, Default)]
pub struct UpOptions {
    /// Don't start linked services (`--no-deps`).
    pub no_deps: bool,
    /// Keep existing containers (`--no-recreate`).
    pub no_recreate: bool,
    /// Remove containers for services no longer in the compose file.
    pub remove_orphans: bool,
    /// Per-service instance counts (`--scale service=count`).
    pub scale: Vec<(String, u32)>,
}

/// Captured output of an in-container command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Production gateway: shells out to `docker compose`.
pub struct ComposeRuntime {
    project_root: PathBuf,
    /// `-f file [-f override] --env-file file` prefix shared by every call.
    file_args: Vec<String>,
}

impl ComposeRuntime {
    pub fn new(config: &OpsConfig, env: Environment) -> Self {
        let env_config = config.environment(env);
        let mut file_args = vec![
            "-f".to_string(),
            config.resolve(&config.compose_file).display().to_string(),
        ];
        if let Some(ref override_file) = env_config.compose_override {
            file_args.push("-f".to_string());
            file_args.push(config.resolve(override_file).display().to_string());
        }
        file_args.push("--env-file".to_string());
        file_args.push(config.resolve(&env_config.env_file).display().to_string());

        Self {
            project_root: config.project_root.clone(),
            file_args,
        }
    }

    async fn run(&self, args: &[String]) -> RuntimeResult<ExecOutput> {
        let mut full = vec!["compose".to_string()];
        full.extend(self.file_args.iter().cloned());
        full.extend(args.iter().cloned());

        let printable = format!("docker {}", full.join(" "));
        debug!(command = %printable, "running compose command");

        let output = Command::new("docker")
            .args(&full)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: printable.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: printable,
                status: output.status.code().unwrap_or(-1),
                stderr: tail_lines(&stderr, 10),
            });
        }

        Ok(ExecOutput { stdout, stderr })
    }
}

#[async_trait]
impl ServiceRuntime for ComposeRuntime {
    async fn pull(&self) -> RuntimeResult<()> {
        self.run(&["pull".to_string(), "--quiet".to_string()])
            .await?;
        Ok(())
    }

    async fn up(&self, services: &[&str], opts: UpOptions) -> RuntimeResult<()> {
        self.run(&up_args(services, &opts)).await?;
        Ok(())
    }

    async fn down(&self, timeout_secs: u64) -> RuntimeResult<()> {
        self.run(&[
            "down".to_string(),
            "--timeout".to_string(),
            timeout_secs.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn ps(&self, service: &str) -> RuntimeResult<bool> {
        // `ps --status running` prints matching service names only.
        let output = self
            .run(&[
                "ps".to_string(),
                "--status".to_string(),
                "running".to_string(),
                "--services".to_string(),
            ])
            .await?;
        Ok(output
            .stdout
            .lines()
            .any(|line| line.trim() == service))
    }

    async fn exec(&self, service: &str, command: &[&str]) -> RuntimeResult<ExecOutput> {
        let mut args = vec![
            "exec".to_string(),
            "-T".to_string(),
            service.to_string(),
        ];
        args.extend(command.iter().map(|s| s.to_string()));
        self.run(&args).await
    }

    async fn exec_with_input(
        &self,
        service: &str,
        command: &[&str],
        input: &str,
    ) -> RuntimeResult<ExecOutput> {
        let mut full = vec!["compose".to_string()];
        full.extend(self.file_args.iter().cloned());
        full.push("exec".to_string());
        full.push("-T".to_string());
        full.push(service.to_string());
        full.extend(command.iter().map(|s| s.to_string()));

        let printable = format!("docker {}", full.join(" "));
        debug!(command = %printable, bytes = input.len(), "running compose command with stdin");

        let mut child = Command::new("docker")
            .args(&full)
            .current_dir(&self.project_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: printable.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|source| RuntimeError::Spawn {
                    command: printable.clone(),
                    source,
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: printable.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: printable,
                status: output.status.code().unwrap_or(-1),
                stderr: tail_lines(&stderr, 10),
            });
        }

        Ok(ExecOutput { stdout, stderr })
    }

    async fn logs(&self, service: &str, tail: u32) -> RuntimeResult<String> {
        let output = self
            .run(&[
                "logs".to_string(),
                "--no-color".to_string(),
                "--tail".to_string(),
                tail.to_string(),
                service.to_string(),
            ])
            .await?;
        Ok(output.stdout)
    }

    async fn prune_dangling(&self) -> RuntimeResult<()> {
        // Plain docker, not compose: reclaim dangling images, stopped
        // containers, and unused networks after a successful deploy.
        for args in [
            ["image", "prune", "-f"],
            ["container", "prune", "-f"],
            ["network", "prune", "-f"],
        ] {
            let printable = format!("docker {}", args.join(" "));
            let result = Command::new("docker")
                .args(args)
                .current_dir(&self.project_root)
                .stdin(Stdio::null())
                .output()
                .await;
            match result {
                Ok(output) if !output.status.success() => {
                    warn!(command = %printable, "prune command failed");
                }
                Err(e) => warn!(command = %printable, error = %e, "prune command failed to spawn"),
                _ => {}
            }
        }
        Ok(())
    }
}

/// Assemble the argument list for `compose up -d`.
fn up_args(services: &[&str], opts: &UpOptions) -> Vec<String> {
    let mut args = vec!["up".to_string(), "-d".to_string()];
    if opts.no_deps {
        args.push("--no-deps".to_string());
    }
    if opts.no_recreate {
        args.push("--no-recreate".to_string());
    }
    if opts.remove_orphans {
        args.push("--remove-orphans".to_string());
    }
    for (service, count) in &opts.scale {
        args.push("--scale".to_string());
        args.push(format!("{service}={count}"));
    }
    args.extend(services.iter().map(|s| s.to_string()));
    args
}

/// Last `n` lines of `text`, for compact error reporting.
fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
