//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during an offer cycle.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("a plan coordinator needs at least one plan manager")]
    NoPlanManagers,

    #[error("plan {plan}: {message}")]
    Plan { plan: String, message: String },

    #[error("state store error: {0}")]
    State(#[from] berth_state::StateError),

    #[error("runtime error: {0}")]
    Runtime(#[from] anyhow::Error),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
