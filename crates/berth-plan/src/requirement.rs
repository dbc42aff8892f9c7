//! Launch requirements handed to the offer matcher.
//!
//! A `Requirement` is what a pod instance needs from the offer pool. How it
//! is derived depends on the recovery type:
//!
//! | Recovery    | Reservations | Placement rule | Host          |
//! |-------------|--------------|----------------|---------------|
//! | `None`      | fresh        | from pod spec  | any           |
//! | `Transient` | reused       | dropped        | previous host |
//! | `Permanent` | fresh        | from pod spec  | any           |

use berth_core::{
    GoalState, PodInstanceRequirement, RecoveryType, TaskRecord, VolumeSpec,
};
use tracing::warn;

use crate::error::{PlanError, PlanResult};

/// Resources for one task of the pod.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequirement {
    /// Task instance name.
    pub name: String,
    pub task_spec: String,
    pub goal: GoalState,
    pub cpus: f64,
    pub memory_mb: u64,
    pub disk_mb: u64,
    pub volume: Option<VolumeSpec>,
    pub readiness_check: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub pod: PodInstanceRequirement,
    pub tasks: Vec<TaskRequirement>,
    pub placement: Option<String>,
    /// Relaunch on the reservations the previous tasks held.
    pub reuse_reservations: bool,
    pub hostname: Option<String>,
}

impl Requirement {
    /// Derive the requirement for `pod`, consulting `existing` records of
    /// its previous launch when relaunching in place.
    pub fn build(pod: &PodInstanceRequirement, existing: &[TaskRecord]) -> PlanResult<Self> {
        let instance = &pod.pod_instance;
        if pod.tasks_to_launch.is_empty() {
            return Err(PlanError::InvalidRequirement {
                pod: pod.name(),
                reason: "no tasks to launch".to_string(),
            });
        }

        let reuse = pod.recovery_type == RecoveryType::Transient;
        let mut tasks = Vec::with_capacity(pod.tasks_to_launch.len());
        for spec_name in &pod.tasks_to_launch {
            let spec = instance
                .pod
                .task(spec_name)
                .ok_or_else(|| PlanError::InvalidRequirement {
                    pod: pod.name(),
                    reason: format!("pod type {} has no task {spec_name}", instance.pod.pod_type),
                })?;
            let name = instance.task_instance_name(spec_name);

            let mut volume = spec.volume.clone();
            if reuse {
                if let Some(previous) = existing.iter().find(|r| r.name == name) {
                    if previous.volume != volume {
                        warn!(
                            task = %name,
                            previous = ?previous.volume,
                            requested = ?volume,
                            "volume cannot change on an in-place relaunch, keeping existing volume"
                        );
                        volume = previous.volume.clone();
                    }
                }
            }

            tasks.push(TaskRequirement {
                name,
                task_spec: spec.name.clone(),
                goal: spec.goal,
                cpus: spec.cpus,
                memory_mb: spec.memory_mb,
                disk_mb: spec.disk_mb,
                volume,
                readiness_check: spec.readiness_check,
            });
        }

        let pod_name = instance.name();
        let hostname = if reuse {
            existing
                .iter()
                .filter(|r| r.pod_instance_name() == pod_name)
                .find_map(|r| r.hostname.clone())
        } else {
            None
        };
        let placement = if reuse { None } else { instance.pod.placement.clone() };

        Ok(Self {
            pod: pod.clone(),
            tasks,
            placement,
            reuse_reservations: reuse,
            hostname,
        })
    }

    pub fn task(&self, name: &str) -> Option<&TaskRequirement> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn recovery_type(&self) -> RecoveryType {
        self.pod.recovery_type
    }

    /// Pod instance name claimed while this requirement is in flight.
    pub fn asset(&self) -> String {
        self.pod.asset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::{PodInstance, PodSpec, TaskSpec};

    fn pod_spec() -> PodSpec {
        let mut server = TaskSpec::new("server", 1.0, 512);
        server.volume = Some(VolumeSpec {
            path: "data".to_string(),
            size_mb: 1000,
        });
        PodSpec {
            pod_type: "node".to_string(),
            count: 1,
            placement: Some("hostname:UNIQUE".to_string()),
            tasks: vec![server, TaskSpec::new("sidecar", 0.1, 32)],
        }
    }

    fn pir(recovery_type: RecoveryType, tasks: &[&str]) -> PodInstanceRequirement {
        PodInstanceRequirement::new(
            PodInstance::new(pod_spec(), 0),
            tasks.iter().map(|t| t.to_string()).collect(),
        )
        .with_recovery_type(recovery_type)
    }

    fn previous() -> Vec<TaskRecord> {
        let instance = PodInstance::new(pod_spec(), 0);
        let mut record = TaskRecord::new(&instance, "server", "id-0").with_hostname("host-7");
        record.volume = Some(VolumeSpec {
            path: "data".to_string(),
            size_mb: 500,
        });
        vec![record]
    }

    #[test]
    fn deploy_keeps_placement() {
        let req = Requirement::build(&pir(RecoveryType::None, &["server"]), &[]).unwrap();
        assert_eq!(req.placement.as_deref(), Some("hostname:UNIQUE"));
        assert!(!req.reuse_reservations);
        assert_eq!(req.tasks[0].name, "node-0-server");
        assert_eq!(req.asset(), "node-0");
    }

    #[test]
    fn transient_pins_previous_host_and_drops_placement_rule() {
        let req =
            Requirement::build(&pir(RecoveryType::Transient, &["server"]), &previous()).unwrap();
        assert!(req.reuse_reservations);
        assert_eq!(req.hostname.as_deref(), Some("host-7"));
        assert_eq!(req.placement, None);
    }

    #[test]
    fn transient_volume_mismatch_keeps_existing_volume() {
        let req =
            Requirement::build(&pir(RecoveryType::Transient, &["server"]), &previous()).unwrap();
        assert_eq!(req.tasks[0].volume.as_ref().unwrap().size_mb, 500);
    }

    #[test]
    fn permanent_discards_previous_placement() {
        let req =
            Requirement::build(&pir(RecoveryType::Permanent, &["server"]), &previous()).unwrap();
        assert!(!req.reuse_reservations);
        assert_eq!(req.hostname, None);
        assert_eq!(req.placement.as_deref(), Some("hostname:UNIQUE"));
        assert_eq!(req.tasks[0].volume.as_ref().unwrap().size_mb, 1000);
    }

    #[test]
    fn unknown_task_fails() {
        let err = Requirement::build(&pir(RecoveryType::None, &["missing"]), &[]).unwrap_err();
        assert!(matches!(err, PlanError::InvalidRequirement { .. }));
    }

    #[test]
    fn empty_task_list_fails() {
        assert!(Requirement::build(&pir(RecoveryType::None, &[]), &[]).is_err());
    }
}
