//! berth-core — shared vocabulary for the Berth plan engine.
//!
//! Holds the identities and records every other crate speaks in: task
//! states and statuses, persisted task records, resource offers and the
//! operations performed against them, pod specs and pod instances, and
//! the TOML service configuration.

pub mod config;
pub mod types;

pub use config::{BerthConfig, DeployConfig, PhaseStrategyKind, RecoveryConfig, parse_duration};
pub use types::*;
