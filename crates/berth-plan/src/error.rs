//! Error types for plan construction.

use thiserror::Error;

/// Result type alias for plan operations.
pub type PlanResult<T> = Result<T, PlanError>;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("invalid requirement for {pod}: {reason}")]
    InvalidRequirement { pod: String, reason: String },

    #[error("invalid dependency: {0}")]
    InvalidDependency(String),
}
