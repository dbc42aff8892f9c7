//! Phase and Plan — ordered composites governed by a strategy.
//!
//! Both are the same generic node: a `Phase` is a `Composite<Step>` and a
//! `Plan` a `Composite<Phase>`. Composite status is never stored; it is
//! computed from the children on every read.

use std::collections::HashSet;

use berth_core::TaskStatus;
use tracing::info;

use crate::element::{Element, ElementId};
use crate::status::Status;
use crate::step::Step;
use crate::strategy::Strategy;

#[derive(Debug, Clone)]
pub struct Composite<C> {
    id: ElementId,
    name: String,
    children: Vec<C>,
    strategy: Strategy,
    errors: Vec<String>,
}

pub type Phase = Composite<Step>;
pub type Plan = Composite<Phase>;

/// Location of a step inside a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepPosition {
    pub phase: usize,
    pub step: usize,
}

impl<C: Element> Composite<C> {
    pub fn new(name: impl Into<String>, children: Vec<C>, strategy: Strategy) -> Self {
        Self {
            id: ElementId::next(),
            name: name.into(),
            children,
            strategy,
            errors: Vec::new(),
        }
    }

    pub fn children(&self) -> &[C] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&C> {
        self.children.iter().find(|c| c.name() == name)
    }

    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut C> {
        self.children.iter_mut()
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut C> {
        self.children.iter_mut().find(|c| c.name() == name)
    }

    /// Replace the child with the same name in place, or append.
    pub fn upsert(&mut self, child: C) -> Option<C> {
        match self.children.iter().position(|c| c.name() == child.name()) {
            Some(i) => Some(std::mem::replace(&mut self.children[i], child)),
            None => {
                self.children.push(child);
                None
            }
        }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn interrupt(&mut self) {
        info!(element = %self.name, "interrupting");
        self.strategy.interrupt();
    }

    pub fn proceed(&mut self) {
        info!(element = %self.name, "proceeding");
        self.strategy.proceed();
    }

    pub fn is_interrupted(&self) -> bool {
        self.strategy.is_interrupted()
    }

    /// Errors recorded on this node itself, excluding children.
    pub fn own_errors(&self) -> &[String] {
        &self.errors
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn set_errors(&mut self, errors: Vec<String>) {
        self.errors = errors;
    }

    /// Indices of children that are candidates while `dirty` assets are claimed.
    pub fn candidates(&self, dirty: &HashSet<String>) -> Vec<usize> {
        self.strategy.candidates(&self.children, dirty)
    }
}

impl<C: Element> Element for Composite<C> {
    fn id(&self) -> ElementId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> Status {
        if !self.errors.is_empty() {
            return Status::Error;
        }
        let aggregate = Status::aggregate(self.children.iter().map(Element::status));
        if self.strategy.is_interrupted() && !aggregate.is_complete() {
            aggregate.max(Status::Waiting)
        } else {
            aggregate
        }
    }

    fn errors(&self) -> Vec<String> {
        let mut errors = self.errors.clone();
        for child in &self.children {
            errors.extend(child.errors());
        }
        errors
    }

    fn update(&mut self, status: &TaskStatus) {
        for child in &mut self.children {
            child.update(status);
        }
    }

    fn restart(&mut self) {
        for child in &mut self.children {
            child.restart();
        }
        self.errors.clear();
    }

    fn force_complete(&mut self) {
        for child in &mut self.children {
            child.force_complete();
        }
        self.errors.clear();
    }

    fn is_eligible(&self, _dirty: &HashSet<String>) -> bool {
        !self.is_complete() && !self.has_errors() && !self.is_interrupted()
    }
}

impl Composite<Phase> {
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.child(name)
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.children.iter().flat_map(|phase| phase.children.iter())
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps().find(|s| s.name() == name)
    }

    pub fn step_mut(&mut self, name: &str) -> Option<&mut Step> {
        self.children
            .iter_mut()
            .flat_map(|phase| phase.children.iter_mut())
            .find(|s| s.name() == name)
    }

    pub fn step_at(&self, pos: StepPosition) -> Option<&Step> {
        self.children.get(pos.phase)?.children.get(pos.step)
    }

    pub fn step_at_mut(&mut self, pos: StepPosition) -> Option<&mut Step> {
        self.children.get_mut(pos.phase)?.children.get_mut(pos.step)
    }

    /// Candidate steps: the plan strategy picks phases, then each picked
    /// phase's strategy picks its steps.
    pub fn step_candidates(&self, dirty: &HashSet<String>) -> Vec<StepPosition> {
        let mut positions = Vec::new();
        for phase in self.candidates(dirty) {
            for step in self.children[phase].candidates(dirty) {
                positions.push(StepPosition { phase, step });
            }
        }
        positions
    }

    /// Assets claimed by steps currently in flight.
    pub fn dirty_assets(&self) -> HashSet<String> {
        self.steps()
            .filter(|s| s.is_in_progress())
            .map(Step::asset)
            .collect()
    }
}
