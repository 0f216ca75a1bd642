//! `chatvault health` — evaluate and render stack health.
//!
//! Exit code follows the monitoring convention: 0 OK, 1 warning,
//! 2 critical.

use std::time::Duration;

use anyhow::bail;

use chatvault_core::{Environment, OpsConfig};
use chatvault_health::{HealthEngine, OutputFormat, RequestedChecks};
use chatvault_runtime::ComposeRuntime;

pub struct HealthArgs {
    pub url: Option<String>,
    pub timeout: u64,
    pub format: String,
    pub environment: String,
}

pub async fn run(config: &OpsConfig, args: HealthArgs) -> anyhow::Result<i32> {
    let environment: Environment = args.environment.parse()?;
    let format = match args.format.as_str() {
        "plain" => OutputFormat::Plain,
        "monitoring" => OutputFormat::Monitoring,
        "json" => OutputFormat::Json,
        other => bail!("unknown output format: {other} (expected plain, monitoring, or json)"),
    };

    let base_url = args
        .url
        .unwrap_or_else(|| config.environment(environment).base_url.clone());

    let runtime = ComposeRuntime::new(config, environment);
    let engine = HealthEngine::new(config, &runtime);
    let report = engine
        .evaluate(
            &base_url,
            Duration::from_secs(args.timeout),
            &RequestedChecks::default(),
        )
        .await;

    println!("{}", report.render(format));
    Ok(report.overall.exit_code())
}
