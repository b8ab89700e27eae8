//! Planner contract.

use geneforge_core::{Diagnosis, PartAssignment, RefinementAction};

/// The action applied in the preceding iteration and its effect.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousStep {
    /// Action that produced the current version
    pub action: RefinementAction,
    /// Whether the current version scores better than its parent
    pub improved: bool,
}

/// Everything a planner may look at.
#[derive(Debug, Clone, Copy)]
pub struct PlanningContext<'a> {
    /// Diagnosis of the current version
    pub diagnosis: &'a Diagnosis,
    /// Assignment of the current version
    pub assignment: &'a PartAssignment,
    /// Preceding step, absent for the initial version
    pub previous: Option<&'a PreviousStep>,
}

impl<'a> PlanningContext<'a> {
    /// Context for a version with no history.
    pub fn new(diagnosis: &'a Diagnosis, assignment: &'a PartAssignment) -> Self {
        Self {
            diagnosis,
            assignment,
            previous: None,
        }
    }

    /// Attach the preceding step.
    pub fn with_previous(mut self, previous: Option<&'a PreviousStep>) -> Self {
        self.previous = previous;
        self
    }
}

/// Chooses exactly one corrective action per diagnosis.
pub trait RefinementPlanner: Send + Sync {
    /// Planner name.
    fn name(&self) -> &str;

    /// Choose the next action.
    fn plan(&self, ctx: &PlanningContext<'_>) -> RefinementAction;
}
