//! The node abstraction shared by steps, phases, and plans.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use berth_core::TaskStatus;

use crate::status::Status;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a plan element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    pub fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node of the plan tree.
pub trait Element {
    fn id(&self) -> ElementId;

    fn name(&self) -> &str;

    fn status(&self) -> Status;

    /// Own errors followed by those of every descendant.
    fn errors(&self) -> Vec<String>;

    fn update(&mut self, status: &TaskStatus);

    /// Return to `Pending`, discarding progress.
    fn restart(&mut self);

    /// Mark `Complete` without doing the remaining work.
    fn force_complete(&mut self);

    /// Whether this element may be handed out as a candidate while the
    /// `dirty` assets are claimed.
    fn is_eligible(&self, dirty: &HashSet<String>) -> bool;

    fn is_complete(&self) -> bool {
        self.status().is_complete()
    }

    fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }

    fn message(&self) -> String {
        format!("'{}' [{}] has status: {}", self.name(), self.id(), self.status())
    }
}
