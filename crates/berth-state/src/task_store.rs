//! The task store interface the plan engine reads failures from.

use berth_core::{TaskRecord, TaskStatus};
use tracing::debug;

use crate::error::{StateError, StateResult};

/// Synchronous store of task records and their latest statuses, keyed by
/// task instance name.
pub trait TaskStore: Send + Sync {
    fn fetch_tasks(&self) -> StateResult<Vec<TaskRecord>>;

    fn fetch_task(&self, name: &str) -> StateResult<Option<TaskRecord>>;

    fn fetch_status(&self, name: &str) -> StateResult<Option<TaskStatus>>;

    /// Insert or replace the given records.
    fn store_tasks(&self, tasks: &[TaskRecord]) -> StateResult<()>;

    fn store_status(&self, name: &str, status: &TaskStatus) -> StateResult<()>;

    /// Records whose latest status calls for a relaunch, plus any carrying
    /// the permanently-failed marker.
    fn fetch_tasks_needing_recovery(&self) -> StateResult<Vec<TaskRecord>> {
        let mut results = Vec::new();
        for task in self.fetch_tasks()? {
            if task.permanently_failed {
                results.push(task);
                continue;
            }
            let failed = match self.fetch_status(&task.name)? {
                Some(status) => task.needs_recovery(&status),
                None => false,
            };
            if failed {
                results.push(task);
            }
        }
        debug!(count = results.len(), "fetched tasks needing recovery");
        Ok(results)
    }

    /// Flag a task as unrecoverable in place, forcing a permanent replacement.
    fn mark_permanently_failed(&self, name: &str) -> StateResult<()> {
        let mut task = self
            .fetch_task(name)?
            .ok_or_else(|| StateError::NotFound(format!("task {name}")))?;
        task.permanently_failed = true;
        self.store_tasks(&[task])
    }
}
