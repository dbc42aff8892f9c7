//! Error types for the Berth task store.

use thiserror::Error;

/// Result type alias for task store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Task store failure. Every variant carries the underlying redb or serde
/// message as text.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot open task store: {0}")]
    Open(String),

    #[error("task store transaction failed: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("cannot encode record: {0}")]
    Serialize(String),

    #[error("cannot decode record: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),
}
