//! Domain types shared across the Berth crates.
//!
//! Tasks, offers and operations are what the cluster scheduler talks in;
//! pod specs and pod instances are what a service is made of. Everything
//! persisted by the task store is serializable to JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Cluster-assigned identifier of one launched task.
pub type TaskId = String;

/// Identifier of a resource offer.
pub type OfferId = String;

// ── Tasks ──────────────────────────────────────────────────────────

/// Lifecycle state reported by the cluster for a launched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Killing,
    Finished,
    Failed,
    Killed,
    Lost,
    Error,
}

impl TaskState {
    /// The task will not report any further state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Finished
                | TaskState::Failed
                | TaskState::Killed
                | TaskState::Lost
                | TaskState::Error
        )
    }

    /// Terminal and unsuccessful.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TaskState::Failed | TaskState::Killed | TaskState::Lost | TaskState::Error
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Staging => "staging",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Killing => "killing",
            TaskState::Finished => "finished",
            TaskState::Failed => "failed",
            TaskState::Killed => "killed",
            TaskState::Lost => "lost",
            TaskState::Error => "error",
        };
        f.write_str(s)
    }
}

/// A status update for one launched task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    /// Set once the task's readiness check has passed.
    #[serde(default)]
    pub ready: bool,
    pub message: Option<String>,
}

impl TaskStatus {
    pub fn new(task_id: impl Into<TaskId>, state: TaskState) -> Self {
        Self {
            task_id: task_id.into(),
            state,
            ready: false,
            message: None,
        }
    }

    /// Mark the readiness check as passed.
    pub fn ready(mut self) -> Self {
        self.ready = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// What a task is expected to do once launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    /// Keep running; a finished task needs relaunching.
    #[default]
    Running,
    /// Run to completion once.
    Finish,
}

/// Persisted record of the most recent launch of a task instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    /// Task instance name, `{pod_type}-{pod_index}-{task_spec}`.
    pub name: String,
    pub task_id: TaskId,
    pub pod_type: String,
    pub pod_index: u32,
    /// Name of the task within its pod spec.
    pub task_spec: String,
    pub goal: GoalState,
    /// Host the task was last placed on.
    pub hostname: Option<String>,
    pub volume: Option<VolumeSpec>,
    /// Operator or monitor asserted the task cannot come back in place.
    #[serde(default)]
    pub permanently_failed: bool,
}

impl TaskRecord {
    pub fn new(pod: &PodInstance, task_spec: &str, task_id: impl Into<TaskId>) -> Self {
        let spec = pod.pod.task(task_spec);
        Self {
            name: pod.task_instance_name(task_spec),
            task_id: task_id.into(),
            pod_type: pod.pod.pod_type.clone(),
            pod_index: pod.index,
            task_spec: task_spec.to_string(),
            goal: spec.map(|t| t.goal).unwrap_or_default(),
            hostname: None,
            volume: spec.and_then(|t| t.volume.clone()),
            permanently_failed: false,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Name of the pod instance this task belongs to.
    pub fn pod_instance_name(&self) -> String {
        pod_instance_name(&self.pod_type, self.pod_index)
    }

    /// Whether the given status (the latest known for this task) calls for
    /// a relaunch.
    pub fn needs_recovery(&self, status: &TaskStatus) -> bool {
        if self.permanently_failed {
            return true;
        }
        if status.task_id != self.task_id {
            return false;
        }
        match status.state {
            TaskState::Finished => self.goal == GoalState::Running,
            state => state.is_failure(),
        }
    }
}

// ── Pods ───────────────────────────────────────────────────────────

/// Persistent volume attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeSpec {
    pub path: String,
    pub size_mb: u64,
}

/// One task within a pod spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default)]
    pub goal: GoalState,
    pub cpus: f64,
    pub memory_mb: u64,
    #[serde(default)]
    pub disk_mb: u64,
    pub volume: Option<VolumeSpec>,
    /// A running task only counts as deployed once it reports ready.
    #[serde(default)]
    pub readiness_check: bool,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, cpus: f64, memory_mb: u64) -> Self {
        Self {
            name: name.into(),
            goal: GoalState::Running,
            cpus,
            memory_mb,
            disk_mb: 0,
            volume: None,
            readiness_check: false,
        }
    }
}

/// A group of tasks deployed and recovered together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodSpec {
    #[serde(rename = "type")]
    pub pod_type: String,
    pub count: u32,
    /// Placement rule handed to the offer matcher, e.g. `"hostname:UNIQUE"`.
    pub placement: Option<String>,
    pub tasks: Vec<TaskSpec>,
}

impl PodSpec {
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name.clone()).collect()
    }
}

/// The full set of pods making up a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default)]
    pub pods: Vec<PodSpec>,
}

impl ServiceSpec {
    pub fn pod(&self, pod_type: &str) -> Option<&PodSpec> {
        self.pods.iter().find(|p| p.pod_type == pod_type)
    }
}

/// One concrete instance of a pod spec.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodInstance {
    pub pod: PodSpec,
    pub index: u32,
}

impl PodInstance {
    pub fn new(pod: PodSpec, index: u32) -> Self {
        Self { pod, index }
    }

    /// `{pod_type}-{index}`; also the asset name claimed while the pod is
    /// being launched.
    pub fn name(&self) -> String {
        pod_instance_name(&self.pod.pod_type, self.index)
    }

    pub fn task_instance_name(&self, task_spec: &str) -> String {
        format!("{}-{task_spec}", self.name())
    }
}

pub fn pod_instance_name(pod_type: &str, index: u32) -> String {
    format!("{pod_type}-{index}")
}

// ── Recovery ───────────────────────────────────────────────────────

/// How a pod is being (re)launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryType {
    /// Initial deployment or update, not a recovery.
    #[default]
    None,
    /// Relaunch in place, keeping reservations and placement.
    Transient,
    /// Redeploy from scratch against the current target configuration.
    Permanent,
}

impl fmt::Display for RecoveryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryType::None => "NONE",
            RecoveryType::Transient => "TRANSIENT",
            RecoveryType::Permanent => "PERMANENT",
        };
        f.write_str(s)
    }
}

/// A pod instance, the tasks of it to launch, and why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodInstanceRequirement {
    pub pod_instance: PodInstance,
    pub tasks_to_launch: Vec<String>,
    pub recovery_type: RecoveryType,
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

impl PodInstanceRequirement {
    pub fn new(pod_instance: PodInstance, tasks_to_launch: Vec<String>) -> Self {
        Self {
            pod_instance,
            tasks_to_launch,
            recovery_type: RecoveryType::None,
            environment: HashMap::new(),
        }
    }

    pub fn with_recovery_type(mut self, recovery_type: RecoveryType) -> Self {
        self.recovery_type = recovery_type;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Deterministic name, `{pod}-{index}:[task, ...]`.
    pub fn name(&self) -> String {
        format!(
            "{}:[{}]",
            self.pod_instance.name(),
            self.tasks_to_launch.join(", ")
        )
    }

    /// The asset this requirement claims while in flight.
    pub fn asset(&self) -> String {
        self.pod_instance.name()
    }
}

// ── Offers ─────────────────────────────────────────────────────────

/// Resources available on one host, to be accepted or declined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: OfferId,
    pub hostname: String,
    pub cpus: f64,
    pub memory_mb: u64,
    pub disk_mb: u64,
}

impl Offer {
    pub fn new(id: impl Into<OfferId>, hostname: impl Into<String>, cpus: f64, memory_mb: u64) -> Self {
        Self {
            id: id.into(),
            hostname: hostname.into(),
            cpus,
            memory_mb,
            disk_mb: 0,
        }
    }
}

/// One operation performed against an offer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub offer_id: OfferId,
    pub kind: OperationKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationKind {
    Reserve {
        cpus: f64,
        memory_mb: u64,
        disk_mb: u64,
    },
    CreateVolume {
        path: String,
        size_mb: u64,
    },
    Launch {
        task_id: TaskId,
        task_name: String,
        /// Launched only to hold resources; never tracked by a step.
        #[serde(default)]
        transient: bool,
    },
}

impl Operation {
    pub fn launch(
        offer_id: impl Into<OfferId>,
        task_id: impl Into<TaskId>,
        task_name: impl Into<String>,
    ) -> Self {
        Self {
            offer_id: offer_id.into(),
            kind: OperationKind::Launch {
                task_id: task_id.into(),
                task_name: task_name.into(),
                transient: false,
            },
        }
    }

    pub fn is_launch(&self) -> bool {
        matches!(self.kind, OperationKind::Launch { .. })
    }

    pub fn is_transient_launch(&self) -> bool {
        matches!(self.kind, OperationKind::Launch { transient: true, .. })
    }

    /// `(task_id, task_name)` of a launch operation.
    pub fn launched_task(&self) -> Option<(&str, &str)> {
        match &self.kind {
            OperationKind::Launch {
                task_id, task_name, ..
            } => Some((task_id.as_str(), task_name.as_str())),
            _ => None,
        }
    }
}
