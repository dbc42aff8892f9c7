//! Recovery error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("invalid recovery configuration: {0}")]
    Config(String),

    #[error("no tasks found for pod {0}")]
    UnknownPod(String),

    #[error("state store error: {0}")]
    State(#[from] berth_state::StateError),
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;
