//! Status vocabulary shared by every plan element.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a step, or the aggregate status of a phase or plan.
///
/// Variants are declared in ascending precedence, so `Ord` gives the
/// aggregation order: `Error > Waiting > InProgress > Pending > Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Complete,
    Pending,
    InProgress,
    Waiting,
    Error,
}

impl Status {
    /// Highest-precedence status among `statuses`; `Complete` when empty.
    pub fn aggregate(statuses: impl IntoIterator<Item = Status>) -> Status {
        statuses.into_iter().max().unwrap_or(Status::Complete)
    }

    pub fn is_complete(self) -> bool {
        self == Status::Complete
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Complete => "COMPLETE",
            Status::Pending => "PENDING",
            Status::InProgress => "IN_PROGRESS",
            Status::Waiting => "WAITING",
            Status::Error => "ERROR",
        };
        f.write_str(s)
    }
}
