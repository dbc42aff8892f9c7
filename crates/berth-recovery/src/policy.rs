//! Recovery policy — the failure monitor and launch constrainer a recovery
//! manager runs with, plus the set of recoverable tasks.

use std::collections::HashSet;
use std::sync::Arc;

use berth_core::RecoveryConfig;
use berth_plan::LaunchConstrainer;
use tracing::info;

use crate::constrain::{TimedLaunchConstrainer, UnconstrainedLaunchConstrainer};
use crate::error::{RecoveryError, RecoveryResult};
use crate::monitor::{FailureMonitor, NeverFailureMonitor, TimedFailureMonitor};

#[derive(Clone)]
pub struct RecoveryPolicy {
    pub constrainer: Arc<dyn LaunchConstrainer>,
    pub monitor: Arc<dyn FailureMonitor>,
    /// Task spec names that may be recovered automatically. All when `None`.
    pub recoverable_tasks: Option<HashSet<String>>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new(
            Arc::new(UnconstrainedLaunchConstrainer),
            Arc::new(NeverFailureMonitor),
        )
    }
}

impl RecoveryPolicy {
    pub fn new(constrainer: Arc<dyn LaunchConstrainer>, monitor: Arc<dyn FailureMonitor>) -> Self {
        Self {
            constrainer,
            monitor,
            recoverable_tasks: None,
        }
    }

    pub fn with_recoverable_tasks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recoverable_tasks = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Timed monitor and constrainer where durations are configured,
    /// otherwise never-fail and unconstrained.
    pub fn from_config(config: &RecoveryConfig) -> RecoveryResult<Self> {
        let timeout = config
            .permanent_failure_timeout()
            .map_err(|e| RecoveryError::Config(e.to_string()))?;
        let delay = config
            .min_replace_delay()
            .map_err(|e| RecoveryError::Config(e.to_string()))?;

        let monitor: Arc<dyn FailureMonitor> = match timeout {
            Some(timeout) => Arc::new(TimedFailureMonitor::new(timeout)),
            None => Arc::new(NeverFailureMonitor),
        };
        let constrainer: Arc<dyn LaunchConstrainer> = match delay {
            Some(delay) => Arc::new(TimedLaunchConstrainer::new(delay)),
            None => Arc::new(UnconstrainedLaunchConstrainer),
        };
        info!(
            permanent_failure_timeout = ?timeout,
            min_replace_delay = ?delay,
            recoverable_tasks = ?config.recoverable_tasks,
            "recovery policy configured"
        );

        Ok(Self {
            constrainer,
            monitor,
            recoverable_tasks: config.recoverable_task_set(),
        })
    }

    pub fn is_recoverable(&self, task_spec: &str) -> bool {
        self.recoverable_tasks
            .as_ref()
            .is_none_or(|names| names.contains(task_spec))
    }
}
