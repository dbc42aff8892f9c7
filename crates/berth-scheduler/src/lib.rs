//! berth-scheduler — distributing one batch of offers across plans.
//!
//! Each offer cycle the coordinator walks its plan managers in order. Every
//! manager hands out candidate steps, the plan scheduler matches them
//! against what is left of the offer pool, and accepted operations are
//! written back onto the steps.
//!
//! # Architecture
//!
//! ```text
//! PlanCoordinator
//!   ├── PlanManager[] (deploy, recovery, ...)
//!   │     └── Mutex<Plan> → Candidates (guard + step positions)
//!   └── PlanScheduler
//!         ├── OfferMatcher   (requirement × offers → operations)
//!         ├── OfferAccepter  (operations → accepted offer ids)
//!         └── TaskKiller     (optional, stops tasks of restarted steps)
//! ```
//!
//! Managers earlier in the list have priority: an asset claimed by one
//! manager is dirty for every manager after it in the same cycle.

pub mod coordinator;
pub mod error;
pub mod manager;
pub mod scheduler;

pub use coordinator::PlanCoordinator;
pub use error::{SchedulerError, SchedulerResult};
pub use manager::{Candidates, DefaultPlanManager, PlanManager};
pub use scheduler::{OfferAccepter, OfferMatcher, PlanScheduler, TaskKiller};
