//! chatvault.toml configuration parser.
//!
//! The whole tool is driven by one `OpsConfig` value constructed at
//! startup. Components never read process environment or change the
//! working directory mid-run; everything they need is resolved here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};

/// Target environment for deploy/rollback operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::UnknownEnvironment(other.to_string())),
        }
    }
}

/// Compose service names for the archive stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNames {
    /// Primary API service.
    pub api: String,
    /// Background worker service.
    pub worker: String,
    /// Periodic task scheduler service.
    pub beat: String,
    /// Relational datastore service.
    pub postgres: String,
    /// Cache/queue service.
    pub redis: String,
    /// Reverse proxy service.
    pub nginx: String,
}

impl Default for ServiceNames {
    fn default() -> Self {
        Self {
            api: "api".to_string(),
            worker: "worker".to_string(),
            beat: "beat".to_string(),
            postgres: "postgres".to_string(),
            redis: "redis".to_string(),
            nginx: "nginx".to_string(),
        }
    }
}

impl ServiceNames {
    /// All services, in start order.
    pub fn all(&self) -> Vec<&str> {
        vec![
            &self.postgres,
            &self.redis,
            &self.api,
            &self.worker,
            &self.beat,
            &self.nginx,
        ]
    }
}

/// Per-environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Compose override file layered on top of the base compose file.
    pub compose_override: Option<PathBuf>,
    /// Env file holding the environment's secrets.
    pub env_file: PathBuf,
    /// Base URL the health checks probe.
    pub base_url: String,
}

/// Timing knobs shared by deploy, rollback, and health waits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Wait after a state-changing runtime command before the next check.
    pub settle_secs: u64,
    /// Bounded shutdown timeout handed to `compose down`.
    pub shutdown_timeout_secs: u64,
    /// Maximum attempts for readiness/liveness polls.
    pub poll_attempts: u32,
    /// Sleep between poll attempts.
    pub poll_interval_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            settle_secs: 10,
            shutdown_timeout_secs: 30,
            poll_attempts: 30,
            poll_interval_secs: 2,
        }
    }
}

/// Datastore credentials, resolved once from the process environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub user: String,
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: "archive".to_string(),
            name: "archive".to_string(),
        }
    }
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".chatvault")
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("media")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_migration_command() -> Vec<String> {
    vec!["alembic".into(), "upgrade".into(), "head".into()]
}

fn default_external_api_url() -> String {
    "https://qyapi.weixin.qq.com".to_string()
}

fn default_secondary_endpoints() -> Vec<String> {
    vec![
        "/api/v1/groups".to_string(),
        "/api/v1/stats/messages".to_string(),
        "/api/v1/sync/tasks".to_string(),
    ]
}

fn default_required_secrets() -> Vec<String> {
    vec![
        "CORP_ID".to_string(),
        "SECRET".to_string(),
        "ENCODING_AES_KEY".to_string(),
    ]
}

/// Top-level configuration for all ChatVault operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    /// Directory holding the compose file, env files, and data dirs.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub services: ServiceNames,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Migration entry point, run inside the primary service container.
    #[serde(default = "default_migration_command")]
    pub migration_command: Vec<String>,
    /// Upstream third-party API probed by the external-dependency check.
    #[serde(default = "default_external_api_url")]
    pub external_api_url: String,
    /// Non-essential read endpoints probed after the liveness path.
    #[serde(default = "default_secondary_endpoints")]
    pub secondary_endpoints: Vec<String>,
    /// Secrets that must be present in the environment's env file.
    #[serde(default = "default_required_secrets")]
    pub required_secrets: Vec<String>,
    pub staging: EnvironmentConfig,
    pub production: EnvironmentConfig,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

impl OpsConfig {
    /// Load configuration from a TOML file.
    ///
    /// Datastore credentials are overridden from `POSTGRES_USER` /
    /// `POSTGRES_DB` when present — the only environment read in the
    /// whole tool, performed once here.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: OpsConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        if let Ok(user) = std::env::var("POSTGRES_USER") {
            config.database.user = user;
        }
        if let Ok(name) = std::env::var("POSTGRES_DB") {
            config.database.name = name;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.migration_command.is_empty() {
            return Err(ConfigError::Invalid(
                "migration_command must not be empty".to_string(),
            ));
        }
        if self.timing.poll_attempts == 0 {
            return Err(ConfigError::Invalid(
                "timing.poll_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-environment overrides for `env`.
    pub fn environment(&self, env: Environment) -> &EnvironmentConfig {
        match env {
            Environment::Staging => &self.staging,
            Environment::Production => &self.production,
        }
    }

    /// Absolute-ish path helpers, anchored at the project root.
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.project_root.join(relative)
        }
    }

    /// Location of the last-backup pointer file.
    pub fn last_backup_pointer(&self) -> PathBuf {
        self.resolve(&self.state_dir).join("last-backup")
    }

    /// Location of the last safety-snapshot pointer file.
    pub fn last_safety_pointer(&self) -> PathBuf {
        self.resolve(&self.state_dir).join("last-safety-snapshot")
    }
}
