//! RecoveryPlanManager — a plan regenerated from the task store every cycle.
//!
//! ```text
//! store.fetch_tasks_needing_recovery()
//!     │  filter recoverable task specs
//!     │  group by pod instance, skip dirty pods
//!     │  add the pod's other running-goal tasks
//!     ▼
//! classify ── all permanent ──▶ PERMANENT
//!          ── none permanent ─▶ TRANSIENT
//!          ── mixed ──────────▶ plan error, skipped
//!     │
//!     ▼
//! overriders / default phase ──▶ upsert into plan by phase name
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use berth_core::{
    BerthConfig, GoalState, PodInstance, PodInstanceRequirement, RecoveryType, ServiceSpec, TaskId,
    TaskRecord, TaskStatus,
};
use berth_plan::{Element, Phase, Plan, Status, Step, Strategy};
use berth_scheduler::{Candidates, PlanManager, SchedulerResult};
use berth_state::TaskStore;
use tracing::{debug, error, info, warn};

use crate::error::{RecoveryError, RecoveryResult};
use crate::overrider::RecoveryPlanOverrider;
use crate::policy::RecoveryPolicy;

pub const RECOVERY_PLAN_NAME: &str = "recovery";

pub struct RecoveryPlanManager {
    store: Arc<dyn TaskStore>,
    service: ServiceSpec,
    policy: RecoveryPolicy,
    overriders: Vec<Arc<dyn RecoveryPlanOverrider>>,
    plan: Mutex<Plan>,
}

impl RecoveryPlanManager {
    pub fn new(store: Arc<dyn TaskStore>, service: ServiceSpec, policy: RecoveryPolicy) -> Self {
        Self {
            store,
            service,
            policy,
            overriders: Vec::new(),
            plan: Mutex::new(Plan::new(RECOVERY_PLAN_NAME, Vec::new(), Strategy::parallel())),
        }
    }

    pub fn from_config(store: Arc<dyn TaskStore>, config: &BerthConfig) -> RecoveryResult<Self> {
        let policy = RecoveryPolicy::from_config(&config.recovery())?;
        Ok(Self::new(store, config.service.clone(), policy))
    }

    /// Consult `overrider` for every pod needing recovery. Overriders are
    /// asked in the order they were added.
    pub fn with_overrider(mut self, overrider: Arc<dyn RecoveryPlanOverrider>) -> Self {
        self.overriders.push(overrider);
        self
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    /// Regenerate the plan outside an offer cycle.
    pub fn refresh(&self, dirty: &HashSet<String>) {
        let mut plan = self.lock();
        self.regenerate(&mut plan, dirty);
    }

    /// Operator request to replace a pod from scratch. Marks every task of
    /// the pod permanently failed; the next cycle schedules a PERMANENT
    /// recovery for it. Returns the number of tasks marked.
    pub fn replace_pod(&self, pod_name: &str) -> RecoveryResult<usize> {
        let tasks: Vec<TaskRecord> = self
            .store
            .fetch_tasks()?
            .into_iter()
            .filter(|t| t.pod_instance_name() == pod_name)
            .collect();
        if tasks.is_empty() {
            return Err(RecoveryError::UnknownPod(pod_name.to_string()));
        }
        for task in &tasks {
            self.store.mark_permanently_failed(&task.name)?;
        }
        info!(pod = %pod_name, tasks = tasks.len(), "pod marked for replacement");
        Ok(tasks.len())
    }

    fn lock(&self) -> MutexGuard<'_, Plan> {
        self.plan.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn regenerate(&self, plan: &mut Plan, dirty: &HashSet<String>) {
        let failed = match self.store.fetch_tasks_needing_recovery() {
            Ok(failed) => failed,
            Err(e) => {
                error!(error = %e, "cannot read failed tasks, keeping previous recovery plan");
                return;
            }
        };
        let failing: HashSet<TaskId> = failed.iter().map(|t| t.task_id.clone()).collect();
        self.policy.monitor.retain_failing(&failing);

        let mut by_pod: BTreeMap<String, Vec<TaskRecord>> = BTreeMap::new();
        for task in failed {
            if !self.policy.is_recoverable(&task.task_spec) {
                debug!(task = %task.name, "task is not recoverable, ignoring failure");
                continue;
            }
            by_pod.entry(task.pod_instance_name()).or_default().push(task);
        }
        if by_pod.is_empty() {
            plan.set_errors(Vec::new());
            return;
        }

        let launched = match self.store.fetch_tasks() {
            Ok(launched) => launched,
            Err(e) => {
                error!(error = %e, "cannot read task records, keeping previous recovery plan");
                return;
            }
        };

        let mut unrecoverable = Vec::new();
        for (pod_name, failed) in by_pod {
            if dirty.contains(&pod_name) {
                debug!(pod = %pod_name, "pod is being worked on elsewhere, not recovering yet");
                continue;
            }

            let failed_names: HashSet<String> = failed.iter().map(|t| t.name.clone()).collect();
            let tasks = self.pod_tasks(&pod_name, failed, &launched);
            let recovery_type = match self.classify(&pod_name, &tasks, &failed_names) {
                Ok(Some(recovery_type)) => recovery_type,
                Ok(None) => {
                    unrecoverable.push(format!(
                        "pod {pod_name} has both permanently failed and recoverable tasks"
                    ));
                    continue;
                }
                Err(e) => {
                    error!(pod = %pod_name, error = %e, "failure monitor error, skipping pod");
                    continue;
                }
            };

            if let Some(step) = Self::covering_step(plan, &pod_name) {
                if step.recovery_type() == recovery_type {
                    debug!(pod = %pod_name, step = %step.name(), "recovery already planned");
                    continue;
                }
                info!(
                    pod = %pod_name,
                    from = %step.recovery_type(),
                    to = %recovery_type,
                    "failure type changed, regenerating recovery"
                );
            }

            let Some(requirement) = self.requirement(&pod_name, &tasks, recovery_type) else {
                continue;
            };
            info!(
                pod = %pod_name,
                recovery_type = %recovery_type,
                tasks = ?requirement.tasks_to_launch,
                "scheduling recovery"
            );
            for phase in self.phases(&requirement, &tasks) {
                plan.upsert(phase);
            }
        }
        plan.set_errors(unrecoverable);
    }

    /// The failed tasks of a pod plus its other recoverable tasks that are
    /// meant to keep running. A pod is relaunched as a whole.
    fn pod_tasks(&self, pod_name: &str, failed: Vec<TaskRecord>, launched: &[TaskRecord]) -> Vec<TaskRecord> {
        let mut tasks = failed;
        let siblings: Vec<TaskRecord> = launched
            .iter()
            .filter(|t| {
                t.goal == GoalState::Running
                    && t.pod_instance_name() == pod_name
                    && self.policy.is_recoverable(&t.task_spec)
                    && !tasks.iter().any(|f| f.name == t.name)
            })
            .cloned()
            .collect();
        if !siblings.is_empty() {
            debug!(pod = %pod_name, siblings = siblings.len(), "relaunching pod siblings of failed tasks");
        }
        tasks.extend(siblings);
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        tasks
    }

    /// `Some(type)` when every task agrees, `None` for a mix. Only tasks in
    /// `failed` are put to the failure monitor; a sibling still running
    /// counts as permanently failed only when marked so.
    fn classify(
        &self,
        pod_name: &str,
        tasks: &[TaskRecord],
        failed: &HashSet<String>,
    ) -> anyhow::Result<Option<RecoveryType>> {
        let mut permanent = 0;
        for task in tasks {
            if task.permanently_failed
                || (failed.contains(&task.name) && self.policy.monitor.has_failed(task)?)
            {
                permanent += 1;
            }
        }
        Ok(if permanent == tasks.len() {
            Some(RecoveryType::Permanent)
        } else if permanent == 0 {
            Some(RecoveryType::Transient)
        } else {
            warn!(
                pod = %pod_name,
                permanent,
                recoverable = tasks.len() - permanent,
                "pod has both permanently failed and recoverable tasks, not recovering"
            );
            None
        })
    }

    /// An unfinished recovery step already launching this pod.
    fn covering_step<'a>(plan: &'a Plan, pod_name: &str) -> Option<&'a Step> {
        plan.steps().find(|step| {
            step.pod_instance_requirement().is_some()
                && step.asset() == pod_name
                && !matches!(step.status(), Status::Complete | Status::Error)
        })
    }

    fn requirement(
        &self,
        pod_name: &str,
        tasks: &[TaskRecord],
        recovery_type: RecoveryType,
    ) -> Option<PodInstanceRequirement> {
        let first = tasks.first()?;
        let Some(spec) = self.service.pod(&first.pod_type) else {
            warn!(pod = %pod_name, pod_type = %first.pod_type, "pod type no longer exists, not recovering");
            return None;
        };
        let mut to_launch: Vec<String> = tasks.iter().map(|t| t.task_spec.clone()).collect();
        to_launch.sort();
        to_launch.dedup();
        Some(
            PodInstanceRequirement::new(PodInstance::new(spec.clone(), first.pod_index), to_launch)
                .with_recovery_type(recovery_type),
        )
    }

    fn phases(&self, requirement: &PodInstanceRequirement, tasks: &[TaskRecord]) -> Vec<Phase> {
        let mut overridden: Vec<Phase> = self
            .overriders
            .iter()
            .filter_map(|o| o.override_phase(requirement))
            .collect();
        if !overridden.is_empty() {
            // Launches from overridden phases still count against the rate limit.
            for step in overridden.iter_mut().flat_map(|phase| phase.children_mut()) {
                if step.pod_instance_requirement().is_some() {
                    step.default_launch_constrainer(&self.policy.constrainer);
                }
            }
            debug!(pod = %requirement.asset(), phases = overridden.len(), "recovery overridden");
            return overridden;
        }

        let step = Step::for_pod(requirement.clone(), tasks)
            .with_launch_constrainer(self.policy.constrainer.clone());
        vec![Phase::new(requirement.asset(), vec![step], Strategy::serial())]
    }

    fn can_launch(&self, recovery_type: RecoveryType) -> bool {
        match self.policy.constrainer.can_launch(recovery_type) {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(%recovery_type, error = %e, "launch constrainer error, holding launch");
                false
            }
        }
    }
}

impl PlanManager for RecoveryPlanManager {
    fn name(&self) -> String {
        RECOVERY_PLAN_NAME.to_string()
    }

    fn plan(&self) -> Plan {
        self.lock().clone()
    }

    fn status(&self) -> Status {
        self.lock().status()
    }

    fn candidates(&self, dirty: &HashSet<String>) -> SchedulerResult<Candidates<'_>> {
        let mut plan = self.lock();
        self.regenerate(&mut plan, dirty);
        let positions = plan.step_candidates(dirty);
        let mut candidates = Candidates::new(plan, positions);
        candidates.retain(|step| self.can_launch(step.recovery_type()));
        debug!(candidates = ?candidates.names(), "recovery candidates");
        Ok(candidates)
    }

    fn update(&self, status: &TaskStatus) {
        self.lock().update(status);
    }

    fn dirty_assets(&self) -> HashSet<String> {
        self.lock().dirty_assets()
    }
}
