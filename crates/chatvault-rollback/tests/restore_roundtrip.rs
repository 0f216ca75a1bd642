//! Backup/restore round-trip tests.
//!
//! Drives the real backup manager and rollback manager together: a
//! configuration captured into a backup set and restored over an edited
//! live tree must come back byte-identical, for plain and compressed
//! sets alike.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use chatvault_backup::{BackupManager, BackupOptions, BackupScope};
use chatvault_core::{Confirm, Environment, OpsConfig};
use chatvault_rollback::{RestoreOptions, RollbackManager};
use chatvault_runtime::{ExecOutput, RuntimeResult, ServiceRuntime, UpOptions};

const DUMP: &str = "--\n-- PostgreSQL database dump\n--\nCREATE TABLE messages ();\n";

struct StackRuntime;

#[async_trait]
impl ServiceRuntime for StackRuntime {
    async fn pull(&self) -> RuntimeResult<()> {
        Ok(())
    }

    async fn up(&self, _services: &[&str], _opts: UpOptions) -> RuntimeResult<()> {
        Ok(())
    }

    async fn down(&self, _timeout_secs: u64) -> RuntimeResult<()> {
        Ok(())
    }

    async fn ps(&self, _service: &str) -> RuntimeResult<bool> {
        Ok(true)
    }

    async fn exec(&self, _service: &str, command: &[&str]) -> RuntimeResult<ExecOutput> {
        let stdout = match command.first().copied() {
            Some("pg_dump") => DUMP.to_string(),
            _ => String::new(),
        };
        Ok(ExecOutput {
            stdout,
            stderr: String::new(),
        })
    }

    async fn exec_with_input(
        &self,
        _service: &str,
        _command: &[&str],
        _input: &str,
    ) -> RuntimeResult<ExecOutput> {
        Ok(ExecOutput {
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    async fn logs(&self, service: &str, _tail: u32) -> RuntimeResult<String> {
        Ok(format!("{service} log line\n"))
    }

    async fn prune_dangling(&self) -> RuntimeResult<()> {
        Ok(())
    }
}

struct Accept;

impl Confirm for Accept {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

fn test_config(root: &Path) -> OpsConfig {
    let mut config: OpsConfig = toml::from_str(
        r#"
[timing]
settle_secs = 0
shutdown_timeout_secs = 5
poll_attempts = 1
poll_interval_secs = 0

[staging]
env_file = ".env.staging"
base_url = "http://127.0.0.1:1"

[production]
env_file = ".env.production"
base_url = "http://127.0.0.1:1"
"#,
    )
    .unwrap();
    config.project_root = root.to_path_buf();
    config
}

fn seed_live(root: &Path) {
    std::fs::write(root.join(".env"), "CORP_ID=ww1234\nSECRET=original\n").unwrap();
    std::fs::write(
        root.join("docker-compose.yml"),
        "services:\n  api:\n    image: archive:1.0\n",
    )
    .unwrap();
    std::fs::create_dir_all(root.join("nginx")).unwrap();
    std::fs::write(root.join("nginx/default.conf"), "server { listen 80; }\n").unwrap();
}

fn live_files(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    [".env", "docker-compose.yml", "nginx/default.conf"]
        .iter()
        .map(|name| {
            let path = root.join(name);
            let bytes = std::fs::read(&path).unwrap();
            (path, bytes)
        })
        .collect()
}

async fn capture(root: &Path, config: &OpsConfig, compress: bool) -> PathBuf {
    let runtime = StackRuntime;
    let manager = BackupManager::new(config, &runtime);
    let set = manager
        .create(
            BackupScope::from_flags(false, true, false, false),
            &BackupOptions {
                destination: root.join("backups"),
                compress,
                dry_run: false,
            },
        )
        .await
        .unwrap();
    set.path
}

fn edit_live(root: &Path) {
    std::fs::write(root.join(".env"), "CORP_ID=ww9999\nSECRET=edited\n").unwrap();
    std::fs::write(
        root.join("docker-compose.yml"),
        "services:\n  api:\n    image: archive:2.0-broken\n",
    )
    .unwrap();
    std::fs::write(root.join("nginx/default.conf"), "server { listen 8080; }\n").unwrap();
}

#[tokio::test]
async fn config_restore_is_byte_identical_after_live_edit() {
    let dir = tempfile::tempdir().unwrap();
    seed_live(dir.path());
    let config = test_config(dir.path());

    let before = live_files(dir.path());
    let set_path = capture(dir.path(), &config, false).await;
    edit_live(dir.path());

    let runtime = StackRuntime;
    let manager = RollbackManager::new(&config, &runtime, &Accept, Environment::Staging);
    manager
        .restore(Some(&set_path), &RestoreOptions::default())
        .await
        .unwrap();

    for (path, original) in before {
        let restored = std::fs::read(&path).unwrap();
        assert_eq!(restored, original, "{} changed across the round trip", path.display());
    }
}

#[tokio::test]
async fn compressed_set_restores_the_same_bytes() {
    let dir = tempfile::tempdir().unwrap();
    seed_live(dir.path());
    let config = test_config(dir.path());

    let before = live_files(dir.path());
    let archive_path = capture(dir.path(), &config, true).await;
    assert!(archive_path.extension().is_some());
    edit_live(dir.path());

    let runtime = StackRuntime;
    let manager = RollbackManager::new(&config, &runtime, &Accept, Environment::Staging);
    manager
        .restore(Some(&archive_path), &RestoreOptions::default())
        .await
        .unwrap();

    for (path, original) in before {
        let restored = std::fs::read(&path).unwrap();
        assert_eq!(restored, original, "{} changed across the round trip", path.display());
    }
}

#[tokio::test]
async fn newest_of_several_sets_wins_without_an_explicit_target() {
    let dir = tempfile::tempdir().unwrap();
    seed_live(dir.path());
    let config = test_config(dir.path());

    // Two captures of different live states; ids have second granularity.
    capture(dir.path(), &config, false).await;
    std::fs::write(dir.path().join(".env"), "CORP_ID=ww1234\nSECRET=second\n").unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    capture(dir.path(), &config, false).await;

    edit_live(dir.path());
    let runtime = StackRuntime;
    let manager = RollbackManager::new(&config, &runtime, &Accept, Environment::Staging);
    manager
        .restore(None, &RestoreOptions::default())
        .await
        .unwrap();

    let env = std::fs::read_to_string(dir.path().join(".env")).unwrap();
    assert!(env.contains("second"), "the newer capture was restored");
}
