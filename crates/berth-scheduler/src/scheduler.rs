//! PlanScheduler — matches candidate steps against a shared offer pool.
//!
//! Candidates are processed one at a time against the same diminishing
//! pool: offers consumed by one candidate are gone for the next.

use std::collections::HashSet;
use std::sync::Arc;

use berth_core::{Offer, OfferId, Operation};
use berth_plan::{Element, Requirement};
use berth_state::TaskStore;
use tracing::{debug, error, info, warn};

use crate::error::SchedulerResult;
use crate::manager::Candidates;

/// Evaluates a requirement against the offers still available.
pub trait OfferMatcher: Send + Sync {
    /// Operations that would satisfy `requirement`, empty if the offers do
    /// not fit. An error means the requirement itself cannot be satisfied.
    fn evaluate(&self, requirement: &Requirement, offers: &[Offer]) -> anyhow::Result<Vec<Operation>>;
}

/// Submits operations to the cluster.
pub trait OfferAccepter: Send + Sync {
    /// Ids of the offers actually accepted; may be a subset on partial failure.
    fn accept(&self, operations: &[Operation]) -> anyhow::Result<Vec<OfferId>>;
}

/// Stops a running task.
pub trait TaskKiller: Send + Sync {
    fn kill(&self, task_id: &str) -> anyhow::Result<()>;
}

pub struct PlanScheduler {
    matcher: Arc<dyn OfferMatcher>,
    accepter: Arc<dyn OfferAccepter>,
    killer: Option<(Arc<dyn TaskKiller>, Arc<dyn TaskStore>)>,
}

impl PlanScheduler {
    pub fn new(matcher: Arc<dyn OfferMatcher>, accepter: Arc<dyn OfferAccepter>) -> Self {
        Self {
            matcher,
            accepter,
            killer: None,
        }
    }

    /// Kill still-running tasks of a step before relaunching it, looking
    /// their ids up in `store`.
    pub fn with_task_killer(mut self, killer: Arc<dyn TaskKiller>, store: Arc<dyn TaskStore>) -> Self {
        self.killer = Some((killer, store));
        self
    }

    /// Try every candidate against `offers`. Returns the ids of the offers
    /// consumed, each at most once.
    pub fn resource_offers(
        &self,
        offers: &[Offer],
        candidates: &mut Candidates<'_>,
    ) -> SchedulerResult<Vec<OfferId>> {
        let mut remaining: Vec<Offer> = offers.to_vec();
        let mut used: Vec<OfferId> = Vec::new();

        for index in 0..candidates.len() {
            let Some(step) = candidates.step_mut(index) else {
                continue;
            };
            if !step.is_pending() {
                debug!(step = %step.name(), status = %step.status(), "skipping step that is not pending");
                continue;
            }
            let Some(requirement) = step.start() else {
                continue;
            };
            if let Err(e) = self.kill_tasks(&requirement) {
                error!(step = %step.name(), error = %e, "failed to look up tasks to kill, step stays pending");
                continue;
            }

            let operations = match self.matcher.evaluate(&requirement, &remaining) {
                Ok(operations) => operations,
                Err(e) => {
                    step.add_error(format!("failed to evaluate requirement: {e}"));
                    continue;
                }
            };
            if operations.is_empty() {
                debug!(step = %step.name(), offers = remaining.len(), "no offers matched");
                step.update_offer_status(&[]);
                continue;
            }

            let accepted = match self.accepter.accept(&operations) {
                Ok(ids) => ids,
                Err(e) => {
                    error!(step = %step.name(), error = %e, "failed to accept offers");
                    Vec::new()
                }
            };
            let accepted = Self::consumed(accepted, &remaining);
            if accepted.is_empty() {
                warn!(step = %step.name(), "no offers were accepted, step stays pending");
                step.update_offer_status(&[]);
                continue;
            }

            let tracked: Vec<Operation> = operations
                .into_iter()
                .filter(|op| !op.is_transient_launch())
                .collect();
            step.update_offer_status(&tracked);
            info!(step = %step.name(), offers = ?accepted, "accepted offers");

            remaining.retain(|offer| !accepted.contains(&offer.id));
            used.extend(accepted);
        }

        Ok(used)
    }

    /// Accepted ids restricted to offers still in the pool, deduplicated.
    fn consumed(accepted: Vec<OfferId>, remaining: &[Offer]) -> Vec<OfferId> {
        let available: HashSet<&str> = remaining.iter().map(|o| o.id.as_str()).collect();
        let mut seen = HashSet::new();
        accepted
            .into_iter()
            .filter(|id| available.contains(id.as_str()) && seen.insert(id.clone()))
            .collect()
    }

    fn kill_tasks(&self, requirement: &Requirement) -> SchedulerResult<()> {
        let Some((killer, store)) = &self.killer else {
            return Ok(());
        };
        for task in &requirement.tasks {
            let Some(record) = store.fetch_task(&task.name)? else {
                continue;
            };
            // No status yet means the launch may still be in flight.
            let running = match store.fetch_status(&task.name)? {
                Some(status) => status.task_id == record.task_id && !status.state.is_terminal(),
                None => true,
            };
            if running {
                info!(task = %task.name, task_id = %record.task_id, "killing task before relaunch");
                if let Err(e) = killer.kill(&record.task_id) {
                    error!(task = %task.name, error = %e, "failed to kill task");
                }
            }
        }
        Ok(())
    }
}
