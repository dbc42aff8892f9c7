//! Offer cycles across several plan managers sharing one offer pool.

use std::collections::HashSet;
use std::sync::Arc;

use berth_core::{
    Offer, OfferId, Operation, PodInstance, PodInstanceRequirement, PodSpec, TaskSpec, TaskState,
    TaskStatus,
};
use berth_plan::{Element, Phase, Plan, Requirement, Status, Step, Strategy};
use berth_scheduler::{
    Candidates, DefaultPlanManager, OfferAccepter, OfferMatcher, PlanCoordinator, PlanManager,
    PlanScheduler, SchedulerError, SchedulerResult,
};

// ── Test collaborators ─────────────────────────────────────────────

/// Places the whole requirement on the first offer with enough CPU.
struct CpuMatcher;

impl OfferMatcher for CpuMatcher {
    fn evaluate(&self, requirement: &Requirement, offers: &[Offer]) -> anyhow::Result<Vec<Operation>> {
        let cpus: f64 = requirement.tasks.iter().map(|t| t.cpus).sum();
        let Some(offer) = offers.iter().find(|o| o.cpus >= cpus) else {
            return Ok(Vec::new());
        };
        Ok(requirement
            .tasks
            .iter()
            .map(|t| Operation::launch(offer.id.clone(), format!("{}-id", t.name), t.name.clone()))
            .collect())
    }
}

struct EchoAccepter;

impl OfferAccepter for EchoAccepter {
    fn accept(&self, operations: &[Operation]) -> anyhow::Result<Vec<OfferId>> {
        Ok(operations.iter().map(|op| op.offer_id.clone()).collect())
    }
}

/// A manager whose candidate computation always fails.
struct BrokenManager;

impl PlanManager for BrokenManager {
    fn name(&self) -> String {
        "broken".to_string()
    }
    fn plan(&self) -> Plan {
        Plan::new("broken", Vec::new(), Strategy::serial())
    }
    fn status(&self) -> Status {
        Status::Pending
    }
    fn candidates(&self, _: &HashSet<String>) -> SchedulerResult<Candidates<'_>> {
        Err(SchedulerError::Plan {
            plan: "broken".to_string(),
            message: "store unavailable".to_string(),
        })
    }
    fn update(&self, _: &TaskStatus) {}
    fn dirty_assets(&self) -> HashSet<String> {
        HashSet::new()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn step(pod_type: &str, index: u32) -> Step {
    let spec = PodSpec {
        pod_type: pod_type.to_string(),
        count: 1,
        placement: None,
        tasks: vec![TaskSpec::new("server", 1.0, 256)],
    };
    Step::for_pod(
        PodInstanceRequirement::new(PodInstance::new(spec, index), vec!["server".to_string()]),
        &[],
    )
}

fn manager(plan_name: &str, pod_type: &str) -> Arc<DefaultPlanManager> {
    Arc::new(DefaultPlanManager::new(Plan::new(
        plan_name,
        vec![Phase::new(pod_type, vec![step(pod_type, 0)], Strategy::serial())],
        Strategy::serial(),
    )))
}

fn offers(n: usize) -> Vec<Offer> {
    (0..n)
        .map(|i| Offer::new(format!("offer-{i}"), format!("host-{i}"), 2.0, 4096))
        .collect()
}

fn scheduler() -> PlanScheduler {
    PlanScheduler::new(Arc::new(CpuMatcher), Arc::new(EchoAccepter))
}

fn coordinator(managers: Vec<Arc<dyn PlanManager>>) -> PlanCoordinator {
    PlanCoordinator::new(managers, scheduler()).unwrap()
}

fn assert_subset_without_duplicates(accepted: &[OfferId], offered: &[Offer]) {
    let unique: HashSet<&OfferId> = accepted.iter().collect();
    assert_eq!(unique.len(), accepted.len(), "duplicate offer ids: {accepted:?}");
    for id in accepted {
        assert!(offered.iter().any(|o| &o.id == id), "unknown offer id {id}");
    }
}

// ── Construction ───────────────────────────────────────────────────

#[test]
fn empty_manager_list_is_rejected() {
    let result = PlanCoordinator::new(Vec::new(), scheduler());
    assert!(matches!(result, Err(SchedulerError::NoPlanManagers)));
}

// ── Mutual exclusion ───────────────────────────────────────────────

#[test]
fn disjoint_assets_both_accept() {
    let deploy = manager("deploy", "alpha");
    let other = manager("other", "beta");
    let coordinator = coordinator(vec![deploy.clone(), other.clone()]);

    let pool = offers(2);
    let accepted = coordinator.process_offers(&pool);
    assert_eq!(accepted.len(), 2);
    assert_subset_without_duplicates(&accepted, &pool);
    assert_eq!(deploy.status(), Status::InProgress);
    assert_eq!(other.status(), Status::InProgress);
}

#[test]
fn shared_asset_only_first_manager_accepts() {
    let deploy = manager("deploy", "node");
    let recovery = manager("recovery", "node");
    let coordinator = coordinator(vec![deploy.clone(), recovery.clone()]);

    let pool = offers(1);
    let accepted = coordinator.process_offers(&pool);
    assert_eq!(accepted, vec!["offer-0".to_string()]);
    assert_eq!(deploy.status(), Status::InProgress);
    assert_eq!(recovery.status(), Status::Pending);
}

#[test]
fn shared_asset_is_claimed_once_even_with_spare_offers() {
    let deploy = manager("deploy", "node");
    let recovery = manager("recovery", "node");
    let coordinator = coordinator(vec![deploy.clone(), recovery.clone()]);

    let pool = offers(3);
    let accepted = coordinator.process_offers(&pool);
    assert_eq!(accepted.len(), 1);
    assert_eq!(recovery.status(), Status::Pending);
}

#[test]
fn in_flight_asset_of_later_manager_blocks_earlier_manager() {
    let deploy = manager("deploy", "node");
    let recovery = manager("recovery", "node");
    recovery.with_plan_mut(|plan| {
        plan.step_mut("node-0:[server]")
            .unwrap()
            .update_offer_status(&[Operation::launch("old", "node-0-server-id", "node-0-server")]);
    });
    let coordinator = coordinator(vec![deploy.clone(), recovery.clone()]);

    let accepted = coordinator.process_offers(&offers(2));
    assert!(accepted.is_empty());
    assert_eq!(deploy.status(), Status::Pending);
}

#[test]
fn pool_shrinks_between_managers() {
    let first = manager("first", "alpha");
    let second = manager("second", "beta");
    let coordinator = coordinator(vec![first.clone(), second.clone()]);

    // Only one offer big enough for anybody.
    let pool = vec![
        Offer::new("big", "host-0", 2.0, 4096),
        Offer::new("tiny", "host-1", 0.1, 64),
    ];
    let accepted = coordinator.process_offers(&pool);
    assert_eq!(accepted, vec!["big".to_string()]);
    assert_eq!(second.status(), Status::Pending);
}

// ── Failure containment ────────────────────────────────────────────

#[test]
fn failing_manager_does_not_stop_the_cycle() {
    let deploy = manager("deploy", "alpha");
    let coordinator = coordinator(vec![Arc::new(BrokenManager), deploy.clone()]);

    let accepted = coordinator.process_offers(&offers(1));
    assert_eq!(accepted.len(), 1);
    assert_eq!(deploy.status(), Status::InProgress);
}

// ── Completion ─────────────────────────────────────────────────────

#[test]
fn complete_plans_accept_nothing() {
    let deploy = manager("deploy", "alpha");
    let other = manager("other", "beta");
    deploy.with_plan_mut(|plan| plan.force_complete());
    other.with_plan_mut(|plan| plan.force_complete());
    let coordinator = coordinator(vec![deploy, other]);

    assert!(!coordinator.has_operations());
    assert!(coordinator.process_offers(&offers(2)).is_empty());
}

#[test]
fn restart_reopens_work() {
    let deploy = manager("deploy", "alpha");
    deploy.with_plan_mut(|plan| plan.force_complete());
    let coordinator = coordinator(vec![deploy.clone()]);
    assert!(!coordinator.has_operations());

    deploy.with_plan_mut(|plan| plan.step_mut("alpha-0:[server]").unwrap().restart());
    assert!(coordinator.has_operations());
    assert_eq!(coordinator.process_offers(&offers(1)).len(), 1);
}

#[test]
fn status_updates_drive_plans_to_completion() {
    let deploy = manager("deploy", "alpha");
    let coordinator = coordinator(vec![deploy.clone()]);
    coordinator.process_offers(&offers(1));

    coordinator.update(&TaskStatus::new("alpha-0-server-id", TaskState::Running));
    assert_eq!(deploy.status(), Status::Complete);
    assert!(!coordinator.has_operations());
    assert!(deploy.plan().errors().is_empty());
}

#[test]
fn repeated_cycles_never_reuse_in_flight_steps() {
    let deploy = manager("deploy", "alpha");
    let coordinator = coordinator(vec![deploy.clone()]);

    assert_eq!(coordinator.process_offers(&offers(1)).len(), 1);
    assert!(coordinator.process_offers(&offers(1)).is_empty());
}
