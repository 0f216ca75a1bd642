//! Health report — severities, aggregation, rendering.

use serde::{Deserialize, Serialize};

/// Severity of one check, totally ordered: Ok < Warning < Critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Ok,
    Warning,
    Critical,
}

impl Severity {
    /// Monitoring-convention exit code: 0 / 1 / 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            Severity::Ok => 0,
            Severity::Warning => 1,
            Severity::Critical => 2,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARN",
            Severity::Critical => "CRIT",
        }
    }
}

/// One recorded check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckEntry {
    pub component: String,
    pub message: String,
    pub severity: Severity,
}

/// Aggregated result of one health evaluation.
///
/// Checks are append-only and keep execution order; the overall status
/// only ever rises as entries are added.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: Severity,
    pub checks: Vec<CheckEntry>,
}

impl HealthReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a check, raising the overall status when needed.
    pub fn record(&mut self, component: &str, message: impl Into<String>, severity: Severity) {
        self.checks.push(CheckEntry {
            component: component.to_string(),
            message: message.into(),
            severity,
        });
        self.overall = self.overall.max(severity);
    }

    pub fn ok(&mut self, component: &str, message: impl Into<String>) {
        self.record(component, message, Severity::Ok);
    }

    pub fn warning(&mut self, component: &str, message: impl Into<String>) {
        self.record(component, message, Severity::Warning);
    }

    pub fn critical(&mut self, component: &str, message: impl Into<String>) {
        self.record(component, message, Severity::Critical);
    }

    /// Number of checks at exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.checks.iter().filter(|c| c.severity == severity).count()
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Plain => self.render_plain(),
            OutputFormat::Monitoring => self.render_monitoring(),
            OutputFormat::Json => self.render_json(),
        }
    }

    fn render_plain(&self) -> String {
        let mut out = String::from("Archive stack health\n");
        out.push_str("====================\n");
        for check in &self.checks {
            out.push_str(&format!(
                "[{}] {}: {}\n",
                check.severity.label(),
                check.component,
                check.message
            ));
        }
        out.push_str(&format!(
            "\nOverall: {} ({} ok, {} warning, {} critical)\n",
            self.overall.label(),
            self.count(Severity::Ok),
            self.count(Severity::Warning),
            self.count(Severity::Critical),
        ));
        out
    }

    fn render_monitoring(&self) -> String {
        let worst = self
            .checks
            .iter()
            .filter(|c| c.severity == self.overall)
            .map(|c| format!("{}: {}", c.component, c.message))
            .next()
            .unwrap_or_else(|| "no checks recorded".to_string());
        match self.overall {
            Severity::Ok => format!("CHATVAULT OK - {} checks passed", self.checks.len()),
            Severity::Warning => format!("CHATVAULT WARNING - {worst}"),
            Severity::Critical => format!("CHATVAULT CRITICAL - {worst}"),
        }
    }

    fn render_json(&self) -> String {
        // Serialization of this shape cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Presentation format for a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Monitoring,
    Json,
}
