//! Plan managers — owners of one plan each.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use berth_core::TaskStatus;
use berth_plan::{Element, Plan, Status, Step, StepPosition};
use tracing::debug;

use crate::error::SchedulerResult;

/// Owns one plan and answers for it during the offer cycle and on the
/// status callback path.
pub trait PlanManager: Send + Sync {
    fn name(&self) -> String;

    /// Snapshot of the current plan.
    fn plan(&self) -> Plan;

    fn status(&self) -> Status;

    /// Steps eligible to launch while the `dirty` assets are claimed. The
    /// plan stays locked until the returned guard is dropped.
    fn candidates(&self, dirty: &HashSet<String>) -> SchedulerResult<Candidates<'_>>;

    fn update(&self, status: &TaskStatus);

    /// Assets claimed by this manager's in-flight steps.
    fn dirty_assets(&self) -> HashSet<String>;
}

/// Candidate steps of one plan, holding that plan's lock.
pub struct Candidates<'a> {
    plan: MutexGuard<'a, Plan>,
    positions: Vec<StepPosition>,
}

impl<'a> Candidates<'a> {
    pub fn new(plan: MutexGuard<'a, Plan>, positions: Vec<StepPosition>) -> Self {
        Self { plan, positions }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        let pos = *self.positions.get(index)?;
        self.plan.step_at(pos)
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut Step> {
        let pos = *self.positions.get(index)?;
        self.plan.step_at_mut(pos)
    }

    /// Keep only candidates whose step satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&Step) -> bool) {
        let plan = &self.plan;
        self.positions
            .retain(|pos| plan.step_at(*pos).is_some_and(|step| keep(step)));
    }

    pub fn names(&self) -> Vec<String> {
        self.positions
            .iter()
            .filter_map(|pos| self.plan.step_at(*pos))
            .map(|step| step.name().to_string())
            .collect()
    }
}

pub(crate) fn lock_plan(plan: &Mutex<Plan>) -> MutexGuard<'_, Plan> {
    // The tree stays structurally valid even if a holder panicked.
    plan.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Plan manager for a plan built once and mutated in place, such as the
/// deploy plan.
pub struct DefaultPlanManager {
    plan: Mutex<Plan>,
}

impl DefaultPlanManager {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan: Mutex::new(plan),
        }
    }

    /// Run an operator action (interrupt, restart, force-complete...)
    /// against the plan.
    pub fn with_plan_mut<R>(&self, f: impl FnOnce(&mut Plan) -> R) -> R {
        f(&mut lock_plan(&self.plan))
    }
}

impl PlanManager for DefaultPlanManager {
    fn name(&self) -> String {
        lock_plan(&self.plan).name().to_string()
    }

    fn plan(&self) -> Plan {
        lock_plan(&self.plan).clone()
    }

    fn status(&self) -> Status {
        lock_plan(&self.plan).status()
    }

    fn candidates(&self, dirty: &HashSet<String>) -> SchedulerResult<Candidates<'_>> {
        let plan = lock_plan(&self.plan);
        let positions = plan.step_candidates(dirty);
        debug!(plan = %plan.name(), candidates = positions.len(), "computed candidates");
        Ok(Candidates::new(plan, positions))
    }

    fn update(&self, status: &TaskStatus) {
        lock_plan(&self.plan).update(status);
    }

    fn dirty_assets(&self) -> HashSet<String> {
        lock_plan(&self.plan).dirty_assets()
    }
}
