//! Step — the leaf unit of work, launching one pod instance.
//!
//! Lifecycle:
//!
//! ```text
//!            start() + accepted ops         task ready / finished
//! PENDING ─────────────────────────▶ IN_PROGRESS ─────────────────▶ COMPLETE
//!    ▲                                    │                              │
//!    └──────── task failure ──────────────┘                              │
//!    └──────────────────────── restart() ────────────────────────────────┘
//! ```
//!
//! A step tracks every task it launched by task id. Statuses for any other
//! task id are ignored, which is what keeps stale duplicate failures from
//! dragging a relaunched step back to `Pending`.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use berth_core::{
    GoalState, Operation, PodInstanceRequirement, RecoveryType, TaskId, TaskRecord, TaskState,
    TaskStatus,
};
use tracing::{debug, error, info, warn};

use crate::constrainer::LaunchConstrainer;
use crate::element::{Element, ElementId};
use crate::requirement::Requirement;
use crate::status::Status;

#[derive(Debug, Clone)]
struct LaunchedTask {
    name: String,
    status: Status,
}

#[derive(Clone)]
pub struct Step {
    id: ElementId,
    name: String,
    status: Status,
    pod: Option<PodInstanceRequirement>,
    requirement: Option<Requirement>,
    errors: Vec<String>,
    launched: BTreeMap<TaskId, LaunchedTask>,
    constrainer: Option<Arc<dyn LaunchConstrainer>>,
}

impl Step {
    /// A step with nothing to launch. It can only be completed by force.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ElementId::next(),
            name: name.into(),
            status: Status::Pending,
            pod: None,
            requirement: None,
            errors: Vec::new(),
            launched: BTreeMap::new(),
            constrainer: None,
        }
    }

    /// A step launching `pod`, named after it. If no requirement can be
    /// built the step starts out in `Error`.
    pub fn for_pod(pod: PodInstanceRequirement, existing: &[TaskRecord]) -> Self {
        let mut step = Self::new(pod.name());
        match Requirement::build(&pod, existing) {
            Ok(requirement) => step.requirement = Some(requirement),
            Err(e) => {
                warn!(step = %step.name, error = %e, "cannot build launch requirement");
                step.errors.push(e.to_string());
                step.status = Status::Error;
            }
        }
        step.pod = Some(pod);
        step
    }

    /// Report successful launches of this step to `constrainer`.
    pub fn with_launch_constrainer(mut self, constrainer: Arc<dyn LaunchConstrainer>) -> Self {
        self.constrainer = Some(constrainer);
        self
    }

    pub fn has_launch_constrainer(&self) -> bool {
        self.constrainer.is_some()
    }

    /// Attach `constrainer` unless one is already set.
    pub fn default_launch_constrainer(&mut self, constrainer: &Arc<dyn LaunchConstrainer>) {
        if self.constrainer.is_none() {
            self.constrainer = Some(Arc::clone(constrainer));
        }
    }

    pub fn requirement(&self) -> Option<&Requirement> {
        self.requirement.as_ref()
    }

    pub fn pod_instance_requirement(&self) -> Option<&PodInstanceRequirement> {
        self.pod.as_ref()
    }

    pub fn recovery_type(&self) -> RecoveryType {
        self.pod
            .as_ref()
            .map(|p| p.recovery_type)
            .unwrap_or_default()
    }

    /// The asset this step claims while in flight: its pod instance name,
    /// or the step name when it launches no pod.
    pub fn asset(&self) -> String {
        match &self.pod {
            Some(pod) => pod.asset(),
            None => self.name.clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    pub fn is_in_progress(&self) -> bool {
        self.status() == Status::InProgress
    }

    pub fn launched_task_ids(&self) -> impl Iterator<Item = &str> {
        self.launched.keys().map(String::as_str)
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(step = %self.name, %message, "step error");
        self.errors.push(message);
        self.status = Status::Error;
    }

    /// The requirement to match against offers, unless there is nothing
    /// left to launch. Status stays as it is until offers are accepted.
    pub fn start(&mut self) -> Option<Requirement> {
        if matches!(self.status(), Status::Complete | Status::Error) {
            return None;
        }
        let requirement = self.requirement.clone()?;
        debug!(step = %self.name, "step started");
        Some(requirement)
    }

    /// Record the outcome of an offer match. Accepted operations move the
    /// step to `InProgress`; none leave it `Pending`.
    pub fn update_offer_status(&mut self, operations: &[Operation]) {
        if self.status() == Status::Error {
            return;
        }
        if operations.is_empty() {
            self.status = Status::Pending;
            return;
        }

        for (task_id, task_name) in operations.iter().filter_map(Operation::launched_task) {
            // A relaunch supersedes whatever this task was before.
            self.launched.retain(|_, t| t.name != task_name);
            self.launched.insert(
                task_id.to_string(),
                LaunchedTask {
                    name: task_name.to_string(),
                    status: Status::InProgress,
                },
            );
        }
        self.status = Status::InProgress;
        info!(step = %self.name, operations = operations.len(), "step launched");

        if let (Some(constrainer), Some(launch)) = (
            &self.constrainer,
            operations.iter().find(|op| op.is_launch()),
        ) {
            if let Err(e) = constrainer.launch_happened(launch, self.recovery_type()) {
                error!(step = %self.name, error = %e, "launch constrainer failed to record launch");
            }
        }
    }

    fn task_status(goal: GoalState, readiness_check: bool, status: &TaskStatus) -> Status {
        match status.state {
            TaskState::Staging | TaskState::Starting | TaskState::Killing => Status::InProgress,
            TaskState::Running => {
                if goal == GoalState::Running && (!readiness_check || status.ready) {
                    Status::Complete
                } else {
                    Status::InProgress
                }
            }
            TaskState::Finished => match goal {
                GoalState::Finish => Status::Complete,
                GoalState::Running => Status::Pending,
            },
            TaskState::Failed | TaskState::Killed | TaskState::Lost | TaskState::Error => {
                Status::Pending
            }
        }
    }

    fn refresh_status(&mut self) {
        let statuses: Vec<Status> = self.launched.values().map(|t| t.status).collect();
        self.status = if statuses.contains(&Status::Pending) {
            Status::Pending
        } else if statuses.iter().all(|s| s.is_complete()) {
            Status::Complete
        } else {
            Status::InProgress
        };
    }
}

impl Element for Step {
    fn id(&self) -> ElementId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        if self.errors.is_empty() {
            self.status
        } else {
            Status::Error
        }
    }

    fn errors(&self) -> Vec<String> {
        self.errors.clone()
    }

    fn update(&mut self, status: &TaskStatus) {
        let Some(task_name) = self.launched.get(&status.task_id).map(|t| t.name.clone()) else {
            return;
        };
        let Some(spec) = self.requirement.as_ref().and_then(|r| r.task(&task_name)) else {
            self.add_error(format!(
                "status for task id {} refers to unknown task {task_name}",
                status.task_id
            ));
            return;
        };
        let task_status = Self::task_status(spec.goal, spec.readiness_check, status);
        if let Some(task) = self.launched.get_mut(&status.task_id) {
            task.status = task_status;
        }

        let before = self.status;
        self.refresh_status();
        if before != self.status {
            info!(
                step = %self.name,
                task = %task_name,
                state = %status.state,
                from = %before,
                to = %self.status,
                "step status changed"
            );
        }
    }

    fn restart(&mut self) {
        info!(step = %self.name, from = %self.status(), "restarting step");
        self.status = Status::Pending;
        self.errors.clear();
        self.launched.clear();
    }

    fn force_complete(&mut self) {
        info!(step = %self.name, from = %self.status(), "forcing step complete");
        self.status = Status::Complete;
        self.errors.clear();
    }

    fn is_eligible(&self, dirty: &HashSet<String>) -> bool {
        !self.is_complete() && self.errors.is_empty() && !dirty.contains(&self.asset())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .field("recovery_type", &self.recovery_type())
            .field("errors", &self.errors)
            .field("launched", &self.launched)
            .finish_non_exhaustive()
    }
}
