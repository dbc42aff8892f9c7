//! berth.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::types::ServiceSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BerthConfig {
    pub service: ServiceSpec,
    pub deploy: Option<DeployConfig>,
    pub recovery: Option<RecoveryConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeployConfig {
    #[serde(default)]
    pub phase_strategy: PhaseStrategyKind,
}

/// Ordering of steps within each deploy phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStrategyKind {
    #[default]
    Serial,
    Parallel,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecoveryConfig {
    /// Task spec names eligible for automatic recovery. All tasks when unset.
    pub recoverable_tasks: Option<Vec<String>>,
    /// How long a task may stay failed before it is treated as permanently lost.
    pub permanent_failure_timeout: Option<String>,
    /// Minimum spacing between permanent replacements.
    pub min_replace_delay: Option<String>,
}

impl RecoveryConfig {
    pub fn recoverable_task_set(&self) -> Option<HashSet<String>> {
        self.recoverable_tasks
            .as_ref()
            .map(|names| names.iter().cloned().collect())
    }

    pub fn permanent_failure_timeout(&self) -> anyhow::Result<Option<Duration>> {
        parse_optional(self.permanent_failure_timeout.as_deref(), "permanent_failure_timeout")
    }

    pub fn min_replace_delay(&self) -> anyhow::Result<Option<Duration>> {
        parse_optional(self.min_replace_delay.as_deref(), "min_replace_delay")
    }
}

impl BerthConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: BerthConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn deploy(&self) -> DeployConfig {
        self.deploy.clone().unwrap_or_default()
    }

    pub fn recovery(&self) -> RecoveryConfig {
        self.recovery.clone().unwrap_or_default()
    }
}

fn parse_optional(value: Option<&str>, field: &str) -> anyhow::Result<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(s) => parse_duration(s)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("invalid duration for {field}: {s:?}")),
    }
}

/// Parse `"500ms"`, `"30s"`, `"20m"`, `"1h"`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        hours.parse::<u64>().ok()?.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GoalState;

    const SAMPLE: &str = r#"
[service]
name = "kv"

[[service.pods]]
type = "node"
count = 3
placement = "hostname:UNIQUE"

[[service.pods.tasks]]
name = "server"
cpus = 1.0
memory_mb = 1024
volume = { path = "data", size_mb = 5000 }

[[service.pods.tasks]]
name = "init"
goal = "finish"
cpus = 0.1
memory_mb = 32

[deploy]
phase_strategy = "parallel"

[recovery]
recoverable_tasks = ["server"]
permanent_failure_timeout = "20m"
min_replace_delay = "10m"
"#;

    #[test]
    fn test_parse_full() {
        let config = BerthConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.service.name, "kv");
        let pod = config.service.pod("node").unwrap();
        assert_eq!(pod.count, 3);
        assert_eq!(pod.task("init").unwrap().goal, GoalState::Finish);
        assert_eq!(pod.task("server").unwrap().volume.as_ref().unwrap().size_mb, 5000);
        assert_eq!(config.deploy().phase_strategy, PhaseStrategyKind::Parallel);

        let recovery = config.recovery();
        assert_eq!(
            recovery.permanent_failure_timeout().unwrap(),
            Some(Duration::from_secs(1200))
        );
        assert!(recovery.recoverable_task_set().unwrap().contains("server"));
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[service]
name = "test"
"#;
        let config = BerthConfig::from_toml_str(toml_str).unwrap();
        assert!(config.service.pods.is_empty());
        assert_eq!(config.deploy().phase_strategy, PhaseStrategyKind::Serial);
        assert!(config.recovery().recoverable_task_set().is_none());
        assert_eq!(config.recovery().min_replace_delay().unwrap(), None);
    }

    #[test]
    fn test_roundtrip() {
        let config = BerthConfig::from_toml_str(SAMPLE).unwrap();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("hostname:UNIQUE"));
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let recovery = RecoveryConfig {
            min_replace_delay: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(recovery.min_replace_delay().is_err());
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("abc"), None);
    }

    #[test]
    fn overflowing_duration_is_rejected() {
        assert_eq!(parse_duration("18446744073709551615m"), None);
        assert_eq!(parse_duration("18446744073709551615h"), None);
        assert_eq!(parse_duration("5124095576030432h"), None);

        let recovery = RecoveryConfig {
            permanent_failure_timeout: Some("307445734561825861m".to_string()),
            ..Default::default()
        };
        assert!(recovery.permanent_failure_timeout().is_err());
    }
}
