//! Replay of recorded actions.

use crate::context::{PlanningContext, RefinementPlanner};
use geneforge_core::RefinementAction;
use geneforge_storage::SessionHistory;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Replays the actions of a recorded session in order, then accepts.
///
/// Lets a session driven by any planner be reproduced exactly.
pub struct ReplayPlanner {
    actions: Vec<RefinementAction>,
    cursor: AtomicUsize,
}

impl ReplayPlanner {
    /// Replay a list of actions.
    pub fn new(actions: Vec<RefinementAction>) -> Self {
        Self {
            actions,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Replay the actions planned in a recorded session.
    pub fn from_history(history: &SessionHistory) -> Self {
        Self::new(history.actions.iter().map(|(_, action)| action.clone()).collect())
    }

    /// Actions not replayed yet.
    pub fn remaining(&self) -> usize {
        self.actions.len().saturating_sub(self.cursor.load(Ordering::SeqCst))
    }
}

impl RefinementPlanner for ReplayPlanner {
    fn name(&self) -> &str {
        "replay"
    }

    fn plan(&self, ctx: &PlanningContext<'_>) -> RefinementAction {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        match self.actions.get(i) {
            Some(action) => action.clone(),
            None => {
                tracing::warn!(
                    "Recording exhausted after {} actions at version {}",
                    self.actions.len(),
                    ctx.diagnosis.version
                );
                RefinementAction::accept("recorded session has no further actions")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geneforge_core::{
        ActionKind, Diagnosis, Netlist, PartAssignment, PartId, SimulationId, Slot, Verdict, VersionId,
    };

    fn empty_context_parts() -> (Diagnosis, PartAssignment) {
        let diagnosis = Diagnosis {
            version: VersionId::new(),
            simulation: SimulationId::new(),
            verdict: Verdict::Fail,
            thresholds: Default::default(),
            rows: vec![],
            constraints: vec![],
            notes: vec![],
        };
        let assignment = PartAssignment { netlist: Netlist::default(), parts: Default::default() };
        (diagnosis, assignment)
    }

    #[test]
    fn test_replays_in_order_then_accepts() {
        let reassign = RefinementAction {
            kind: ActionKind::Reassign { slot: Slot::Reporter("GFP".into()), exclude: PartId::new("GFP") },
            rationale: "recorded".into(),
        };
        let planner = ReplayPlanner::new(vec![reassign.clone()]);
        let (diagnosis, assignment) = empty_context_parts();
        let ctx = PlanningContext::new(&diagnosis, &assignment);

        assert_eq!(planner.remaining(), 1);
        assert_eq!(planner.plan(&ctx), reassign);
        assert!(planner.plan(&ctx).is_accept());
        assert_eq!(planner.remaining(), 0);
    }
}
