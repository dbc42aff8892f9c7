//! PlanCoordinator — one offer cycle across every plan manager.
//!
//! ```text
//! offers ──▶ dirty := ∪ manager.dirty_assets()
//!            for manager in order:
//!              candidates(dirty) ──▶ PlanScheduler ──▶ used offer ids
//!              dirty += manager.dirty_assets(); pool -= used
//!        ◀── accepted offer ids
//! ```
//!
//! No two managers claim the same asset within one cycle and no offer is
//! consumed twice. When two managers want the same asset, the one earlier
//! in the list wins.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use berth_core::{Offer, OfferId, TaskStatus};
use berth_plan::Status;
use tracing::{debug, error, info};

use crate::error::{SchedulerError, SchedulerResult};
use crate::manager::PlanManager;
use crate::scheduler::PlanScheduler;

pub struct PlanCoordinator {
    managers: Vec<Arc<dyn PlanManager>>,
    scheduler: PlanScheduler,
    /// Serializes offer cycles.
    cycle: Mutex<()>,
}

impl PlanCoordinator {
    pub fn new(
        managers: Vec<Arc<dyn PlanManager>>,
        scheduler: PlanScheduler,
    ) -> SchedulerResult<Self> {
        if managers.is_empty() {
            return Err(SchedulerError::NoPlanManagers);
        }
        Ok(Self {
            managers,
            scheduler,
            cycle: Mutex::new(()),
        })
    }

    pub fn managers(&self) -> &[Arc<dyn PlanManager>] {
        &self.managers
    }

    /// Offer `offers` to every manager in turn. Returns the ids of the
    /// offers accepted this cycle; everything else may be declined.
    pub fn process_offers(&self, offers: &[Offer]) -> Vec<OfferId> {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);

        let mut dirty: HashSet<String> = self
            .managers
            .iter()
            .flat_map(|manager| manager.dirty_assets())
            .collect();
        let mut remaining: Vec<Offer> = offers.to_vec();
        let mut accepted: Vec<OfferId> = Vec::new();

        for manager in &self.managers {
            let name = manager.name();
            match self.process_manager(manager.as_ref(), &name, &remaining, &dirty) {
                Ok(used) => {
                    if !used.is_empty() {
                        info!(plan = %name, offers = ?used, "plan accepted offers");
                    }
                    remaining.retain(|offer| !used.contains(&offer.id));
                    accepted.extend(used);
                }
                Err(e) => {
                    error!(plan = %name, error = %e, "plan failed to process offers");
                }
            }
            dirty.extend(manager.dirty_assets());
        }

        debug!(
            offered = offers.len(),
            accepted = accepted.len(),
            "offer cycle finished"
        );
        accepted
    }

    fn process_manager(
        &self,
        manager: &dyn PlanManager,
        name: &str,
        offers: &[Offer],
        dirty: &HashSet<String>,
    ) -> SchedulerResult<Vec<OfferId>> {
        // The candidates guard holds the plan lock; don't call back into
        // the manager until it is dropped.
        let mut candidates = manager.candidates(dirty)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        debug!(plan = %name, candidates = ?candidates.names(), "offering to candidates");
        self.scheduler.resource_offers(offers, &mut candidates)
    }

    /// Forward a task status to every plan.
    pub fn update(&self, status: &TaskStatus) {
        for manager in &self.managers {
            manager.update(status);
        }
    }

    /// Whether any plan still has work left.
    pub fn has_operations(&self) -> bool {
        self.managers
            .iter()
            .any(|manager| manager.status() != Status::Complete)
    }
}
