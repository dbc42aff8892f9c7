//! Candidate selection strategies.
//!
//! A strategy decides which children of a phase or plan may be worked on
//! right now. It never mutates the children; the only state it carries is
//! whether it has been interrupted.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::info;

use berth_core::PhaseStrategyKind;

use crate::element::Element;
use crate::error::{PlanError, PlanResult};

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyKind {
    /// Only the first incomplete child, in order.
    Serial,
    /// Every eligible child at once.
    Parallel,
    /// Every eligible child, shuffled. A seed makes the order reproducible.
    Random { seed: Option<u64> },
    /// Eligible children whose prerequisites are all complete.
    Dependency(DependencyGraph),
}

#[derive(Debug, Clone)]
pub struct Strategy {
    kind: StrategyKind,
    interrupted: bool,
}

impl Strategy {
    pub fn new(kind: StrategyKind) -> Self {
        Self {
            kind,
            interrupted: false,
        }
    }

    pub fn serial() -> Self {
        Self::new(StrategyKind::Serial)
    }

    pub fn parallel() -> Self {
        Self::new(StrategyKind::Parallel)
    }

    pub fn random() -> Self {
        Self::new(StrategyKind::Random { seed: None })
    }

    pub fn random_seeded(seed: u64) -> Self {
        Self::new(StrategyKind::Random { seed: Some(seed) })
    }

    pub fn dependency(graph: DependencyGraph) -> Self {
        Self::new(StrategyKind::Dependency(graph))
    }

    pub fn kind(&self) -> &StrategyKind {
        &self.kind
    }

    /// Stop handing out candidates. Children already in flight carry on.
    pub fn interrupt(&mut self) {
        if !self.interrupted {
            info!("strategy interrupted");
        }
        self.interrupted = true;
    }

    pub fn proceed(&mut self) {
        if self.interrupted {
            info!("strategy resumed");
        }
        self.interrupted = false;
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Indices of the children of `children` that are candidates while the
    /// `dirty` assets are claimed.
    pub fn candidates<E: Element>(&self, children: &[E], dirty: &HashSet<String>) -> Vec<usize> {
        if self.interrupted {
            return Vec::new();
        }

        match &self.kind {
            StrategyKind::Serial => children
                .iter()
                .position(|c| !c.is_complete())
                .filter(|&i| children[i].is_eligible(dirty))
                .into_iter()
                .collect(),
            StrategyKind::Parallel => eligible(children, dirty),
            StrategyKind::Random { seed } => {
                let mut candidates = eligible(children, dirty);
                match seed {
                    Some(seed) => candidates.shuffle(&mut StdRng::seed_from_u64(*seed)),
                    None => candidates.shuffle(&mut rand::thread_rng()),
                }
                candidates
            }
            StrategyKind::Dependency(graph) => eligible(children, dirty)
                .into_iter()
                .filter(|&i| {
                    graph.prerequisites(children[i].name()).all(|prereq| {
                        children
                            .iter()
                            .find(|c| c.name() == prereq)
                            .is_some_and(|c| c.is_complete())
                    })
                })
                .collect(),
        }
    }
}

impl From<PhaseStrategyKind> for Strategy {
    fn from(kind: PhaseStrategyKind) -> Self {
        match kind {
            PhaseStrategyKind::Serial => Strategy::serial(),
            PhaseStrategyKind::Parallel => Strategy::parallel(),
            PhaseStrategyKind::Random => Strategy::random(),
        }
    }
}

fn eligible<E: Element>(children: &[E], dirty: &HashSet<String>) -> Vec<usize> {
    children
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_eligible(dirty))
        .map(|(i, _)| i)
        .collect()
}

// ── Dependency graph ───────────────────────────────────────────────

/// Child name → names of the children it waits for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyGraph {
    prerequisites: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn prerequisites<'a>(&'a self, child: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.prerequisites
            .get(child)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Whether `to` is reachable from `from` following prerequisite edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if seen.insert(node) {
                stack.extend(self.prerequisites(node));
            }
        }
        false
    }
}

/// Builds a validated [`DependencyGraph`] over a known set of child names.
#[derive(Debug)]
pub struct DependencyBuilder {
    names: BTreeSet<String>,
    graph: DependencyGraph,
}

impl DependencyBuilder {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            graph: DependencyGraph::default(),
        }
    }

    /// `child` may not start until `prerequisite` is complete.
    pub fn add_dependency(&mut self, child: &str, prerequisite: &str) -> PlanResult<&mut Self> {
        for name in [child, prerequisite] {
            if !self.names.contains(name) {
                return Err(PlanError::InvalidDependency(format!("unknown element {name}")));
            }
        }
        if self.graph.reaches(prerequisite, child) {
            return Err(PlanError::InvalidDependency(format!(
                "{child} -> {prerequisite} would create a cycle"
            )));
        }
        self.graph
            .prerequisites
            .entry(child.to_string())
            .or_default()
            .insert(prerequisite.to_string());
        Ok(self)
    }

    pub fn graph(self) -> DependencyGraph {
        self.graph
    }

    pub fn build(self) -> Strategy {
        Strategy::dependency(self.graph)
    }
}
