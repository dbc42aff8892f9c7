//! berth-plan — the hierarchical deployment state machine.
//!
//! A [`Plan`] is an ordered list of [`Phase`]s, a phase an ordered list of
//! [`Step`]s. Every composite carries one [`Strategy`] deciding which of
//! its children may be handed out as scheduling candidates. Steps hold the
//! only stored state; phase and plan status is always computed from the
//! children below them.
//!
//! # Components
//!
//! - **`status`**: `Status` and its aggregation order
//! - **`element`**: the `Element` trait shared by steps and composites
//! - **`step`**: leaf unit of work for one pod instance
//! - **`strategy`**: serial, parallel, random, and dependency ordering
//! - **`composite`**: generic `Phase` / `Plan` node
//! - **`requirement`**: launch requirement derived from a pod instance
//! - **`constrainer`**: `LaunchConstrainer` seam recovery steps report to
//! - **`factory`**: builds the deploy plan from a service spec

pub mod composite;
pub mod constrainer;
pub mod element;
pub mod error;
pub mod factory;
pub mod requirement;
pub mod status;
pub mod step;
pub mod strategy;

pub use composite::{Composite, Phase, Plan, StepPosition};
pub use constrainer::LaunchConstrainer;
pub use element::{Element, ElementId};
pub use error::{PlanError, PlanResult};
pub use factory::{DEPLOY_PLAN_NAME, deploy_plan};
pub use requirement::{Requirement, TaskRequirement};
pub use status::Status;
pub use step::Step;
pub use strategy::{DependencyBuilder, DependencyGraph, Strategy, StrategyKind};
