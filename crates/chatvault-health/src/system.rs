//! System resource checks — disk, memory, load average.
//!
//! These always run first, whatever subset of component checks was
//! requested. Thresholds follow operations practice for this stack:
//! disk > 90% critical, > 80% warning; memory > 90% warning; load > 4.0
//! warning.

use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::report::{HealthReport, Severity};

const DISK_CRITICAL_PCT: u64 = 90;
const DISK_WARNING_PCT: u64 = 80;
const MEMORY_WARNING_PCT: u64 = 90;
const LOAD_WARNING: f64 = 4.0;

/// Run all resource checks, recording results into `report`.
pub async fn check_system(report: &mut HealthReport, mount: &Path) {
    match disk_used_percent(mount).await {
        Some(pct) => {
            let severity = disk_severity(pct);
            report.record("system", format!("disk usage {pct}%"), severity);
        }
        None => report.warning("system", "disk usage unavailable"),
    }

    match memory_used_percent() {
        Some(pct) => {
            let severity = memory_severity(pct);
            report.record("system", format!("memory usage {pct}%"), severity);
        }
        None => report.warning("system", "memory usage unavailable"),
    }

    match load_average() {
        Some(load) => {
            let severity = load_severity(load);
            report.record("system", format!("load average {load:.2}"), severity);
        }
        None => report.warning("system", "load average unavailable"),
    }
}

pub fn disk_severity(pct: u64) -> Severity {
    if pct > DISK_CRITICAL_PCT {
        Severity::Critical
    } else if pct > DISK_WARNING_PCT {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

pub fn memory_severity(pct: u64) -> Severity {
    if pct > MEMORY_WARNING_PCT {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

pub fn load_severity(load: f64) -> Severity {
    if load > LOAD_WARNING {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

/// Used percentage of the filesystem holding `mount`, via `df -B1`.
async fn disk_used_percent(mount: &Path) -> Option<u64> {
    let output = Command::new("df")
        .arg("-B1")
        .arg(mount)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_df_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `df -B1` output into a used percentage.
pub fn parse_df_output(stdout: &str) -> Option<u64> {
    let line = stdout.trim().lines().nth(1)?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    let total: u64 = parts.get(1)?.parse().ok()?;
    let used: u64 = parts.get(2)?.parse().ok()?;
    if total == 0 {
        return None;
    }
    Some(used * 100 / total)
}

fn memory_used_percent() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo(&meminfo)
}

/// Used percentage from /proc/meminfo (total minus available).
pub fn parse_meminfo(meminfo: &str) -> Option<u64> {
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = first_number(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = first_number(rest);
        }
    }
    let (total, available) = (total?, available?);
    if total == 0 {
        return None;
    }
    Some((total - available.min(total)) * 100 / total)
}

fn first_number(s: &str) -> Option<u64> {
    s.split_whitespace().next()?.parse().ok()
}

fn load_average() -> Option<f64> {
    let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
    parse_loadavg(&loadavg)
}

/// One-minute load from /proc/loadavg.
pub fn parse_loadavg(loadavg: &str) -> Option<f64> {
    let value = loadavg.split_whitespace().next()?.parse().ok();
    debug!(?value, "parsed load average");
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn df_parsing() {
        let out = "Filesystem     1B-blocks       Used  Available Use% Mounted on\n\
                   /dev/sda1     1000000000  850000000  150000000  85% /\n";
        assert_eq!(parse_df_output(out), Some(85));
    }

    #[test]
    fn df_parsing_rejects_truncated_output() {
        assert_eq!(parse_df_output("Filesystem 1B-blocks\n"), None);
        assert_eq!(parse_df_output(""), None);
    }

    #[test]
    fn meminfo_parsing() {
        let meminfo = "MemTotal:       16000000 kB\n\
                       MemFree:         1000000 kB\n\
                       MemAvailable:    4000000 kB\n";
        assert_eq!(parse_meminfo(meminfo), Some(75));
    }

    #[test]
    fn loadavg_parsing() {
        assert_eq!(parse_loadavg("1.52 1.10 0.95 2/345 12345\n"), Some(1.52));
        assert_eq!(parse_loadavg(""), None);
    }

    #[test]
    fn disk_thresholds() {
        assert_eq!(disk_severity(50), Severity::Ok);
        assert_eq!(disk_severity(80), Severity::Ok);
        assert_eq!(disk_severity(81), Severity::Warning);
        assert_eq!(disk_severity(90), Severity::Warning);
        assert_eq!(disk_severity(91), Severity::Critical);
    }

    #[test]
    fn memory_thresholds() {
        assert_eq!(memory_severity(90), Severity::Ok);
        assert_eq!(memory_severity(91), Severity::Warning);
    }

    #[test]
    fn load_thresholds() {
        assert_eq!(load_severity(4.0), Severity::Ok);
        assert_eq!(load_severity(4.1), Severity::Warning);
    }
}
