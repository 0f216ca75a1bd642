//! Rollout strategies — rolling, blue-green, recreate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// How running service instances are replaced during a deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Restart the primary and worker services in place, then reconcile
    /// the rest. Default.
    Rolling,
    /// Add green capacity alongside the running blue instances, health
    /// check, and only then retire the old instances.
    BlueGreen,
    /// Stop everything, pull, start fresh. Highest downtime, simplest
    /// correctness.
    Recreate,
}

/// Instances per scaled service while green capacity runs alongside
/// blue — twice the configured single instance.
pub const BLUE_GREEN_SCALE: u32 = 2;

impl Default for Strategy {
    fn default() -> Self {
        Self::Rolling
    }
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Rolling => "rolling",
            Strategy::BlueGreen => "blue-green",
            Strategy::Recreate => "recreate",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rolling" => Ok(Strategy::Rolling),
            "blue-green" | "bluegreen" => Ok(Strategy::BlueGreen),
            "recreate" => Ok(Strategy::Recreate),
            other => Err(DeployError::UnknownStrategy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_rolling() {
        assert_eq!(Strategy::default(), Strategy::Rolling);
    }

    #[test]
    fn parses_all_strategies() {
        assert_eq!("rolling".parse::<Strategy>().unwrap(), Strategy::Rolling);
        assert_eq!("blue-green".parse::<Strategy>().unwrap(), Strategy::BlueGreen);
        assert_eq!("recreate".parse::<Strategy>().unwrap(), Strategy::Recreate);
        assert!("canary".parse::<Strategy>().is_err());
    }

    #[test]
    fn serializes_kebab_case() {
        let json = serde_json::to_string(&Strategy::BlueGreen).unwrap();
        assert_eq!(json, "\"blue-green\"");
    }
}
