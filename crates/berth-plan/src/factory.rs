//! Builds the deploy plan for a service.

use berth_core::{DeployConfig, PodInstance, PodInstanceRequirement, ServiceSpec};
use tracing::info;

use crate::composite::{Phase, Plan};
use crate::step::Step;
use crate::strategy::Strategy;

pub const DEPLOY_PLAN_NAME: &str = "deploy";

/// One phase per pod type, in spec order, each holding one step per pod
/// instance that launches every task of the pod. Phases run serially.
pub fn deploy_plan(service: &ServiceSpec, config: &DeployConfig) -> Plan {
    let phases: Vec<Phase> = service
        .pods
        .iter()
        .map(|pod| {
            let steps = (0..pod.count)
                .map(|index| {
                    let instance = PodInstance::new(pod.clone(), index);
                    Step::for_pod(PodInstanceRequirement::new(instance, pod.task_names()), &[])
                })
                .collect();
            Phase::new(pod.pod_type.clone(), steps, Strategy::from(config.phase_strategy))
        })
        .collect();

    info!(
        service = %service.name,
        phases = phases.len(),
        strategy = ?config.phase_strategy,
        "built deploy plan"
    );
    Plan::new(DEPLOY_PLAN_NAME, phases, Strategy::serial())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::status::Status;
    use berth_core::{BerthConfig, PhaseStrategyKind};
    use std::collections::HashSet;

    fn config() -> BerthConfig {
        BerthConfig::from_toml_str(
            r#"
[service]
name = "kv"

[[service.pods]]
type = "meta"
count = 1

[[service.pods.tasks]]
name = "server"
cpus = 0.5
memory_mb = 256

[[service.pods]]
type = "data"
count = 3

[[service.pods.tasks]]
name = "server"
cpus = 1.0
memory_mb = 1024

[[service.pods.tasks]]
name = "agent"
cpus = 0.1
memory_mb = 32
"#,
        )
        .unwrap()
    }

    #[test]
    fn one_phase_per_pod_type() {
        let config = config();
        let plan = deploy_plan(&config.service, &config.deploy());
        assert_eq!(plan.name(), DEPLOY_PLAN_NAME);
        let names: Vec<&str> = plan.children().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["meta", "data"]);
        assert_eq!(plan.phase("data").unwrap().children().len(), 3);
        assert!(plan.step("data-2:[server, agent]").is_some());
        assert_eq!(plan.status(), Status::Pending);
    }

    #[test]
    fn phases_follow_configured_strategy() {
        let config = config();
        let deploy = DeployConfig {
            phase_strategy: PhaseStrategyKind::Parallel,
        };
        let mut plan = deploy_plan(&config.service, &deploy);
        plan.step_mut("meta-0:[server]").unwrap().force_complete();

        // Serial across phases, parallel within the data phase.
        assert_eq!(plan.step_candidates(&HashSet::new()).len(), 3);
    }

    #[test]
    fn serial_phase_offers_one_step() {
        let config = config();
        let plan = deploy_plan(&config.service, &config.deploy());
        let candidates = plan.step_candidates(&HashSet::new());
        assert_eq!(candidates.len(), 1);
        assert_eq!(plan.step_at(candidates[0]).unwrap().name(), "meta-0:[server]");
    }
}
