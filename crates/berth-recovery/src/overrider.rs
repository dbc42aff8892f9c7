//! Hook for replacing the generated recovery phase of a pod.

use berth_core::PodInstanceRequirement;
use berth_plan::Phase;

/// Supplies a custom recovery phase for pods that need more than a plain
/// relaunch, e.g. a bootstrap task before the replacement starts.
///
/// The returned phase should be named after the pod instance
/// (`requirement.pod_instance.name()`); recovery phases are merged by name.
pub trait RecoveryPlanOverrider: Send + Sync {
    fn override_phase(&self, requirement: &PodInstanceRequirement) -> Option<Phase>;
}
