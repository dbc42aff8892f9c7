//! Failure monitors — deciding when a failed task is gone for good.
//!
//! A task that has failed is relaunched in place (transient recovery)
//! until a monitor declares it permanently failed, at which point its pod is
//! replaced from scratch.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use berth_core::{TaskId, TaskRecord};
use tracing::{debug, warn};

pub trait FailureMonitor: Send + Sync {
    /// Whether `task`, already known to need recovery, should be treated as
    /// permanently failed. Errors are treated as "cannot decide" and the
    /// pod is left alone for the cycle.
    fn has_failed(&self, task: &TaskRecord) -> anyhow::Result<bool>;

    /// Drop any history kept for tasks outside `failing`, the ids that
    /// still need recovery as of the latest scan.
    fn retain_failing(&self, _failing: &HashSet<TaskId>) {}
}

/// Never declares a task permanently failed.
#[derive(Debug, Default)]
pub struct NeverFailureMonitor;

impl FailureMonitor for NeverFailureMonitor {
    fn has_failed(&self, _task: &TaskRecord) -> anyhow::Result<bool> {
        Ok(false)
    }
}

/// Declares a task permanently failed once it has been observed failed for
/// at least `timeout`. Observation starts the first time the task id is
/// asked about.
#[derive(Debug)]
pub struct TimedFailureMonitor {
    timeout: Duration,
    first_seen: Mutex<HashMap<TaskId, Instant>>,
}

impl TimedFailureMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            first_seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of task ids currently being timed.
    pub fn tracked(&self) -> usize {
        self.first_seen.lock().map(|seen| seen.len()).unwrap_or(0)
    }
}

impl FailureMonitor for TimedFailureMonitor {
    fn has_failed(&self, task: &TaskRecord) -> anyhow::Result<bool> {
        let mut seen = self
            .first_seen
            .lock()
            .map_err(|_| anyhow::anyhow!("failure history lock poisoned"))?;
        let first = *seen
            .entry(task.task_id.clone())
            .or_insert_with(Instant::now);
        let failed = first.elapsed() >= self.timeout;
        if failed {
            warn!(
                task = %task.name,
                task_id = %task.task_id,
                timeout = ?self.timeout,
                "task failed for longer than the permanent failure timeout"
            );
        }
        Ok(failed)
    }

    fn retain_failing(&self, failing: &HashSet<TaskId>) {
        if let Ok(mut seen) = self.first_seen.lock() {
            let before = seen.len();
            seen.retain(|task_id, _| failing.contains(task_id));
            if seen.len() < before {
                debug!(dropped = before - seen.len(), "dropped failure history of recovered tasks");
            }
        }
    }
}

/// Declares exactly the configured task names permanently failed.
#[derive(Debug, Default)]
pub struct TestingFailureMonitor {
    failed: Mutex<HashSet<String>>,
}

impl TestingFailureMonitor {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failed: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn set_failed(&self, name: &str, failed: bool) {
        if let Ok(mut set) = self.failed.lock() {
            if failed {
                set.insert(name.to_string());
            } else {
                set.remove(name);
            }
        }
    }
}

impl FailureMonitor for TestingFailureMonitor {
    fn has_failed(&self, task: &TaskRecord) -> anyhow::Result<bool> {
        let set = self
            .failed
            .lock()
            .map_err(|_| anyhow::anyhow!("failure set lock poisoned"))?;
        Ok(set.contains(&task.name))
    }
}
