//! Precondition checks — run before the state machine starts.
//!
//! A failed precondition is fatal before anything changes: no partial
//! run, nothing to roll back.

use std::collections::HashSet;
use std::path::Path;

use tokio::process::Command;
use tracing::{debug, warn};

use chatvault_core::{Environment, OpsConfig};

use crate::error::{DeployError, DeployResult};

/// Tools that must be on PATH for a deploy.
const REQUIRED_TOOLS: &[&str] = &["docker", "git"];

/// Run every precondition check for `env`.
pub async fn check_all(
    config: &OpsConfig,
    env: Environment,
    allow_dirty: bool,
) -> DeployResult<()> {
    let missing = missing_tools(REQUIRED_TOOLS);
    if !missing.is_empty() {
        return Err(DeployError::Precondition(format!(
            "required tools not found on PATH: {}",
            missing.join(", ")
        )));
    }

    check_compose_files(config, env)?;
    check_env_secrets(config, env)?;

    if allow_dirty {
        debug!("skipping clean-worktree check");
    } else {
        check_clean_worktree(&config.project_root).await?;
    }
    Ok(())
}

/// Which of `tools` cannot be found on PATH.
pub fn missing_tools(tools: &[&str]) -> Vec<String> {
    tools
        .iter()
        .filter(|tool| which::which(tool).is_err())
        .map(|tool| tool.to_string())
        .collect()
}

/// The base compose file and the environment's override must exist.
fn check_compose_files(config: &OpsConfig, env: Environment) -> DeployResult<()> {
    let base = config.resolve(&config.compose_file);
    if !base.is_file() {
        return Err(DeployError::Precondition(format!(
            "compose file not found: {}",
            base.display()
        )));
    }
    if let Some(ref override_file) = config.environment(env).compose_override {
        let path = config.resolve(override_file);
        if !path.is_file() {
            return Err(DeployError::Precondition(format!(
                "compose override not found: {}",
                path.display()
            )));
        }
    }
    Ok(())
}

/// The environment's env file must exist and define every required secret.
fn check_env_secrets(config: &OpsConfig, env: Environment) -> DeployResult<()> {
    let env_file = config.resolve(&config.environment(env).env_file);
    let defined = read_env_keys(&env_file)?;

    let missing: Vec<&str> = config
        .required_secrets
        .iter()
        .map(|s| s.as_str())
        .filter(|secret| !defined.contains(*secret))
        .collect();
    if !missing.is_empty() {
        return Err(DeployError::Precondition(format!(
            "{} is missing required secrets: {}",
            env_file.display(),
            missing.join(", ")
        )));
    }
    Ok(())
}

/// Keys defined in an env file; non-empty values only.
fn read_env_keys(env_file: &Path) -> DeployResult<HashSet<String>> {
    let iter = dotenvy::from_path_iter(env_file).map_err(|e| {
        DeployError::Precondition(format!("cannot read {}: {e}", env_file.display()))
    })?;

    let mut keys = HashSet::new();
    for item in iter {
        let (key, value) = item.map_err(|e| {
            DeployError::Precondition(format!("cannot parse {}: {e}", env_file.display()))
        })?;
        if !value.trim().is_empty() {
            keys.insert(key);
        }
    }
    Ok(keys)
}

/// Refuse to deploy over uncommitted local changes.
async fn check_clean_worktree(project_root: &Path) -> DeployResult<()> {
    let output = Command::new("git")
        .args(["status", "--porcelain"])
        .current_dir(project_root)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            if output.stdout.is_empty() {
                Ok(())
            } else {
                Err(DeployError::Precondition(
                    "uncommitted local changes present (use --force to deploy anyway)".to_string(),
                ))
            }
        }
        // Not a git checkout: nothing to protect.
        Ok(_) | Err(_) => {
            warn!("not a git worktree, skipping clean-worktree check");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &Path) -> OpsConfig {
        let mut config: OpsConfig = toml::from_str(
            r#"
[staging]
env_file = ".env.staging"
base_url = "http://localhost:8000"

[production]
compose_override = "docker-compose.prod.yml"
env_file = ".env.production"
base_url = "https://archive.example.com"
"#,
        )
        .unwrap();
        config.project_root = root.to_path_buf();
        config
    }

    #[test]
    fn reports_missing_tools() {
        let missing = missing_tools(&["ls", "definitely-not-a-real-tool-9f3a"]);
        assert_eq!(missing, vec!["definitely-not-a-real-tool-9f3a"]);
    }

    #[test]
    fn env_file_with_all_secrets_passes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env.staging"),
            "CORP_ID=ww1234\nSECRET=abc\nENCODING_AES_KEY=xyz\nEXTRA=1\n",
        )
        .unwrap();
        let config = test_config(dir.path());
        check_env_secrets(&config, Environment::Staging).unwrap();
    }

    #[test]
    fn missing_secret_is_named_in_the_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env.staging"), "CORP_ID=ww1234\nSECRET=abc\n").unwrap();
        let config = test_config(dir.path());
        let err = check_env_secrets(&config, Environment::Staging).unwrap_err();
        assert!(err.to_string().contains("ENCODING_AES_KEY"));
    }

    #[test]
    fn empty_secret_value_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env.staging"),
            "CORP_ID=ww1234\nSECRET=abc\nENCODING_AES_KEY=\n",
        )
        .unwrap();
        let config = test_config(dir.path());
        assert!(check_env_secrets(&config, Environment::Staging).is_err());
    }

    #[test]
    fn absent_env_file_is_a_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let err = check_env_secrets(&config, Environment::Staging).unwrap_err();
        assert!(matches!(err, DeployError::Precondition(_)));
    }

    #[test]
    fn compose_files_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        assert!(check_compose_files(&config, Environment::Staging).is_err());

        std::fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
        check_compose_files(&config, Environment::Staging).unwrap();

        // Production also needs its override file.
        assert!(check_compose_files(&config, Environment::Production).is_err());
        std::fs::write(dir.path().join("docker-compose.prod.yml"), "services: {}\n").unwrap();
        check_compose_files(&config, Environment::Production).unwrap();
    }
}
