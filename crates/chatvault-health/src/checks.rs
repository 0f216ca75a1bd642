//! Component health checks and the evaluation engine.

use std::time::Duration;

use tracing::{debug, info};

use chatvault_core::OpsConfig;
use chatvault_runtime::ServiceRuntime;

use crate::probe::{self, ProbeFailure};
use crate::report::{HealthReport, Severity};
use crate::system;

/// API round trips slower than this are flagged.
const API_LATENCY_WARNING: Duration = Duration::from_secs(2);

/// Datastore connections above this are flagged.
const DB_CONNECTION_WARNING: u64 = 80;

/// Cache clients above this are flagged.
const CACHE_CLIENT_WARNING: u64 = 100;

/// Which component checks to run. System resource checks always run.
#[derive(Debug, Clone, Copy)]
pub struct RequestedChecks {
    pub api: bool,
    pub database: bool,
    pub cache: bool,
    pub workers: bool,
    pub external: bool,
}

impl Default for RequestedChecks {
    fn default() -> Self {
        Self {
            api: true,
            database: true,
            cache: true,
            workers: true,
            external: true,
        }
    }
}

impl RequestedChecks {
    pub fn none() -> Self {
        Self {
            api: false,
            database: false,
            cache: false,
            workers: false,
            external: false,
        }
    }
}

/// Evaluates the health of the whole stack.
pub struct HealthEngine<'a> {
    config: &'a OpsConfig,
    runtime: &'a dyn ServiceRuntime,
}

impl<'a> HealthEngine<'a> {
    pub fn new(config: &'a OpsConfig, runtime: &'a dyn ServiceRuntime) -> Self {
        Self { config, runtime }
    }

    /// Run one full evaluation and return the aggregated report.
    pub async fn evaluate(
        &self,
        base_url: &str,
        timeout: Duration,
        requested: &RequestedChecks,
    ) -> HealthReport {
        let mut report = HealthReport::new();

        system::check_system(&mut report, &self.config.project_root).await;

        if requested.api {
            self.check_api(&mut report, base_url, timeout).await;
        }
        if requested.database {
            self.check_database(&mut report).await;
        }
        if requested.cache {
            self.check_cache(&mut report).await;
        }
        if requested.workers {
            self.check_workers(&mut report).await;
        }
        if requested.external {
            self.check_external(&mut report, timeout).await;
        }

        info!(overall = ?report.overall, checks = report.checks.len(), "health evaluation complete");
        report
    }

    async fn check_api(&self, report: &mut HealthReport, base_url: &str, timeout: Duration) {
        let Some(target) = probe::parse_base_url(base_url) else {
            report.critical("api", format!("invalid base URL: {base_url}"));
            return;
        };

        let response = match probe::http_get(&target, "/health", timeout).await {
            Ok(response) => response,
            Err(ProbeFailure::TimedOut) | Err(ProbeFailure::Unreachable) => {
                // No response means the remaining API sub-checks are moot.
                report.critical("api", "API service no response");
                return;
            }
        };

        if response.status == 200 && response.body.contains("healthy") {
            report.ok("api", "API responding with healthy status");
        } else if response.status == 200 {
            report.warning("api", "API response missing healthy marker");
        } else {
            report.warning("api", format!("API returned status {}", response.status));
        }

        let latency_secs = response.latency.as_secs_f64();
        if response.latency > API_LATENCY_WARNING {
            report.warning("api", format!("API latency {latency_secs:.2}s"));
        } else {
            report.ok("api", format!("API latency {latency_secs:.2}s"));
        }

        for endpoint in &self.config.secondary_endpoints {
            match probe::http_get(&target, endpoint, timeout).await {
                Ok(_) => report.ok("api", format!("endpoint {endpoint} responding")),
                Err(_) => report.warning("api", format!("endpoint {endpoint} not responding")),
            }
        }
    }

    async fn check_database(&self, report: &mut HealthReport) {
        let service = &self.config.services.postgres;
        match self.runtime.ps(service).await {
            Ok(true) => report.ok("database", "database service running"),
            Ok(false) => {
                report.critical("database", "database service not running");
                return;
            }
            Err(e) => {
                report.critical("database", format!("cannot query runtime: {e}"));
                return;
            }
        }

        let db = &self.config.database;
        let ready = self
            .runtime
            .exec(service, &["pg_isready", "-U", &db.user, "-d", &db.name])
            .await;
        match ready {
            Ok(_) => report.ok("database", "database accepting connections"),
            Err(e) => {
                report.critical("database", format!("database not ready: {e}"));
                return;
            }
        }

        let count = self
            .runtime
            .exec(
                service,
                &[
                    "psql",
                    "-U",
                    &db.user,
                    "-d",
                    &db.name,
                    "-tAc",
                    "SELECT count(*) FROM pg_stat_activity;",
                ],
            )
            .await;
        match count {
            Ok(output) => match output.stdout.trim().parse::<u64>() {
                Ok(n) if n > DB_CONNECTION_WARNING => {
                    report.warning("database", format!("{n} active connections"));
                }
                Ok(n) => report.ok("database", format!("{n} active connections")),
                Err(_) => report.warning("database", "connection count unavailable"),
            },
            Err(_) => report.warning("database", "connection count unavailable"),
        }

        // Size telemetry is informational only.
        let size = self
            .runtime
            .exec(
                service,
                &[
                    "psql",
                    "-U",
                    &db.user,
                    "-d",
                    &db.name,
                    "-tAc",
                    "SELECT pg_size_pretty(pg_database_size(current_database()));",
                ],
            )
            .await;
        if let Ok(output) = size {
            report.ok(
                "database",
                format!("database size {}", output.stdout.trim()),
            );
        } else {
            debug!("database size telemetry unavailable");
        }
    }

    async fn check_cache(&self, report: &mut HealthReport) {
        let service = &self.config.services.redis;
        match self.runtime.ps(service).await {
            Ok(true) => report.ok("cache", "cache service running"),
            Ok(false) => {
                report.critical("cache", "cache service not running");
                return;
            }
            Err(e) => {
                report.critical("cache", format!("cannot query runtime: {e}"));
                return;
            }
        }

        match self.runtime.exec(service, &["redis-cli", "ping"]).await {
            Ok(output) if output.stdout.contains("PONG") => {
                report.ok("cache", "cache responding to ping");
            }
            Ok(_) => {
                report.critical("cache", "cache ping returned unexpected output");
                return;
            }
            Err(e) => {
                report.critical("cache", format!("cache not responding: {e}"));
                return;
            }
        }

        if let Ok(output) = self
            .runtime
            .exec(service, &["redis-cli", "info", "memory"])
            .await
        {
            if let Some(used) = redis_info_field(&output.stdout, "used_memory_human") {
                report.ok("cache", format!("cache memory {used}"));
            }
        }

        if let Ok(output) = self
            .runtime
            .exec(service, &["redis-cli", "info", "clients"])
            .await
        {
            match redis_info_field(&output.stdout, "connected_clients")
                .and_then(|v| v.parse::<u64>().ok())
            {
                Some(n) if n > CACHE_CLIENT_WARNING => {
                    report.warning("cache", format!("{n} connected clients"));
                }
                Some(n) => report.ok("cache", format!("{n} connected clients")),
                None => report.warning("cache", "client count unavailable"),
            }
        }
    }

    async fn check_workers(&self, report: &mut HealthReport) {
        let worker = &self.config.services.worker;
        let beat = &self.config.services.beat;

        let worker_running = match self.runtime.ps(worker).await {
            Ok(true) => {
                report.ok("workers", "worker service running");
                true
            }
            Ok(false) => {
                report.critical("workers", "worker service not running");
                false
            }
            Err(e) => {
                report.critical("workers", format!("cannot query runtime: {e}"));
                false
            }
        };

        match self.runtime.ps(beat).await {
            Ok(true) => report.ok("workers", "scheduler service running"),
            Ok(false) => report.critical("workers", "scheduler service not running"),
            Err(e) => report.critical("workers", format!("cannot query runtime: {e}")),
        }

        if worker_running {
            // Workers may be transiently busy; a failed inspect is not fatal.
            let inspect = self
                .runtime
                .exec(worker, &["celery", "inspect", "ping", "-t", "5"])
                .await;
            match inspect {
                Ok(output) if output.stdout.contains("pong") => {
                    report.ok("workers", "worker responding to inspect ping");
                }
                Ok(_) | Err(_) => {
                    report.warning("workers", "worker not responding to inspect ping");
                }
            }
        }
    }

    async fn check_external(&self, report: &mut HealthReport, timeout: Duration) {
        let Some(target) = probe::parse_base_url(&self.config.external_api_url) else {
            report.warning(
                "external",
                format!("invalid external API URL: {}", self.config.external_api_url),
            );
            return;
        };

        // External outages must not by themselves trigger a rollback.
        if probe::tcp_reachable(&target.address, timeout).await {
            report.ok("external", format!("{} reachable", target.host));
        } else {
            report.warning("external", format!("{} not reachable", target.host));
        }

        if probe::dns_resolves(&target.host).await {
            report.ok("external", format!("{} resolves", target.host));
        } else {
            report.warning("external", format!("{} does not resolve", target.host));
        }
    }
}

/// Extract `field:value` from `redis-cli info` output.
fn redis_info_field(info: &str, field: &str) -> Option<String> {
    info.lines().find_map(|line| {
        line.strip_prefix(field)?
            .strip_prefix(':')
            .map(|v| v.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatvault_runtime::{ExecOutput, RuntimeError, RuntimeResult, UpOptions};

    struct FakeRuntime {
        postgres_running: bool,
        redis_running: bool,
        worker_running: bool,
        beat_running: bool,
        pg_ready: bool,
        connections: u64,
        clients: u64,
        celery_responds: bool,
    }

    impl Default for FakeRuntime {
        fn default() -> Self {
            Self {
                postgres_running: true,
                redis_running: true,
                worker_running: true,
                beat_running: true,
                pg_ready: true,
                connections: 12,
                clients: 3,
                celery_responds: true,
            }
        }
    }

    fn command_failed(what: &str) -> RuntimeError {
        RuntimeError::CommandFailed {
            command: what.to_string(),
            status: 1,
            stderr: "boom".to_string(),
        }
    }

    fn ok_output(stdout: &str) -> ExecOutput {
        ExecOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[async_trait]
    impl ServiceRuntime for FakeRuntime {
        async fn pull(&self) -> RuntimeResult<()> {
            Ok(())
        }

        async fn up(&self, _services: &[&str], _opts: UpOptions) -> RuntimeResult<()> {
            Ok(())
        }

        async fn down(&self, _timeout_secs: u64) -> RuntimeResult<()> {
            Ok(())
        }

        async fn ps(&self, service: &str) -> RuntimeResult<bool> {
            Ok(match service {
                "postgres" => self.postgres_running,
                "redis" => self.redis_running,
                "worker" => self.worker_running,
                "beat" => self.beat_running,
                _ => true,
            })
        }

        async fn exec(&self, _service: &str, command: &[&str]) -> RuntimeResult<ExecOutput> {
            match command.first().copied() {
                Some("pg_isready") => {
                    if self.pg_ready {
                        Ok(ok_output("accepting connections"))
                    } else {
                        Err(command_failed("pg_isready"))
                    }
                }
                Some("psql") => {
                    let query = command.last().unwrap_or(&"");
                    if query.contains("pg_stat_activity") {
                        Ok(ok_output(&format!("{}\n", self.connections)))
                    } else {
                        Ok(ok_output("42 MB\n"))
                    }
                }
                Some("redis-cli") => match command.get(1).copied() {
                    Some("ping") => Ok(ok_output("PONG\n")),
                    Some("info") if command.get(2) == Some(&"memory") => {
                        Ok(ok_output("used_memory_human:1.5M\r\n"))
                    }
                    Some("info") => Ok(ok_output(&format!(
                        "connected_clients:{}\r\n",
                        self.clients
                    ))),
                    _ => Err(command_failed("redis-cli")),
                },
                Some("celery") => {
                    if self.celery_responds {
                        Ok(ok_output("worker@host: OK pong\n"))
                    } else {
                        Err(command_failed("celery inspect ping"))
                    }
                }
                _ => Err(command_failed("unknown")),
            }
        }

        async fn exec_with_input(
            &self,
            _service: &str,
            _command: &[&str],
            _input: &str,
        ) -> RuntimeResult<ExecOutput> {
            Ok(ok_output(""))
        }

        async fn logs(&self, _service: &str, _tail: u32) -> RuntimeResult<String> {
            Ok(String::new())
        }

        async fn prune_dangling(&self) -> RuntimeResult<()> {
            Ok(())
        }
    }

    fn test_config() -> OpsConfig {
        toml::from_str(
            r#"
[staging]
env_file = ".env.staging"
base_url = "http://localhost:8000"

[production]
env_file = ".env.production"
base_url = "https://archive.example.com"
"#,
        )
        .unwrap()
    }

    fn entries_for<'r>(report: &'r HealthReport, component: &str) -> Vec<&'r crate::report::CheckEntry> {
        report
            .checks
            .iter()
            .filter(|c| c.component == component)
            .collect()
    }

    #[tokio::test]
    async fn unreachable_api_is_critical_no_response() {
        let config = test_config();
        let runtime = FakeRuntime::default();
        let engine = HealthEngine::new(&config, &runtime);

        let mut report = HealthReport::new();
        engine
            .check_api(&mut report, "http://127.0.0.1:1", Duration::from_secs(2))
            .await;

        assert_eq!(report.overall, Severity::Critical);
        let api = entries_for(&report, "api");
        assert_eq!(api.len(), 1, "sub-checks short-circuit on no response");
        assert_eq!(api[0].message, "API service no response");
    }

    #[tokio::test]
    async fn database_gate_is_critical_when_service_down() {
        let config = test_config();
        let runtime = FakeRuntime {
            postgres_running: false,
            ..Default::default()
        };
        let engine = HealthEngine::new(&config, &runtime);

        let mut report = HealthReport::new();
        engine.check_database(&mut report).await;

        assert_eq!(report.overall, Severity::Critical);
        assert_eq!(entries_for(&report, "database").len(), 1);
    }

    #[tokio::test]
    async fn database_not_ready_is_critical() {
        let config = test_config();
        let runtime = FakeRuntime {
            pg_ready: false,
            ..Default::default()
        };
        let engine = HealthEngine::new(&config, &runtime);

        let mut report = HealthReport::new();
        engine.check_database(&mut report).await;
        assert_eq!(report.overall, Severity::Critical);
    }

    #[tokio::test]
    async fn connection_count_over_threshold_warns() {
        let config = test_config();
        let runtime = FakeRuntime {
            connections: 81,
            ..Default::default()
        };
        let engine = HealthEngine::new(&config, &runtime);

        let mut report = HealthReport::new();
        engine.check_database(&mut report).await;

        assert_eq!(report.overall, Severity::Warning);
        assert!(
            report
                .checks
                .iter()
                .any(|c| c.severity == Severity::Warning && c.message.contains("81"))
        );
    }

    #[tokio::test]
    async fn healthy_database_is_all_ok() {
        let config = test_config();
        let runtime = FakeRuntime::default();
        let engine = HealthEngine::new(&config, &runtime);

        let mut report = HealthReport::new();
        engine.check_database(&mut report).await;

        assert_eq!(report.overall, Severity::Ok);
        // Gate, readiness, connections, size.
        assert_eq!(entries_for(&report, "database").len(), 4);
    }

    #[tokio::test]
    async fn cache_gate_and_telemetry() {
        let config = test_config();
        let runtime = FakeRuntime {
            clients: 120,
            ..Default::default()
        };
        let engine = HealthEngine::new(&config, &runtime);

        let mut report = HealthReport::new();
        engine.check_cache(&mut report).await;

        assert_eq!(report.overall, Severity::Warning);
        assert!(report.checks.iter().any(|c| c.message.contains("120")));
        assert!(report.checks.iter().any(|c| c.message.contains("1.5M")));
    }

    #[tokio::test]
    async fn cache_down_is_critical() {
        let config = test_config();
        let runtime = FakeRuntime {
            redis_running: false,
            ..Default::default()
        };
        let engine = HealthEngine::new(&config, &runtime);

        let mut report = HealthReport::new();
        engine.check_cache(&mut report).await;
        assert_eq!(report.overall, Severity::Critical);
    }

    #[tokio::test]
    async fn busy_worker_is_warning_only() {
        let config = test_config();
        let runtime = FakeRuntime {
            celery_responds: false,
            ..Default::default()
        };
        let engine = HealthEngine::new(&config, &runtime);

        let mut report = HealthReport::new();
        engine.check_workers(&mut report).await;

        assert_eq!(report.overall, Severity::Warning);
        assert!(
            entries_for(&report, "workers")
                .iter()
                .all(|c| c.severity != Severity::Critical)
        );
    }

    #[tokio::test]
    async fn missing_scheduler_is_critical() {
        let config = test_config();
        let runtime = FakeRuntime {
            beat_running: false,
            ..Default::default()
        };
        let engine = HealthEngine::new(&config, &runtime);

        let mut report = HealthReport::new();
        engine.check_workers(&mut report).await;
        assert_eq!(report.overall, Severity::Critical);
    }

    #[test]
    fn redis_info_field_parsing() {
        let info = "# Clients\r\nconnected_clients:7\r\nblocked_clients:0\r\n";
        assert_eq!(redis_info_field(info, "connected_clients").as_deref(), Some("7"));
        assert_eq!(redis_info_field(info, "maxclients"), None);
    }
}
