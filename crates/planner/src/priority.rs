//! Priority-ordered refinement policy.
//!
//! Logic failures first, then leak, ON level and response time. Ties are
//! broken by row index, output order and slot order, never by chance.

use crate::context::{PlanningContext, RefinementPlanner};
use geneforge_adapters::{PromoterTuner, RbsTuner, SequenceTuner, TuningBounds};
use geneforge_core::{
    ActionKind, ConstraintCheck, ConstraintKind, Diagnosis, Direction, Lever, PartAssignment,
    RefinementAction, RowCheck, Slot, TunedParameter,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The deterministic planner.
pub struct PriorityPlanner {
    promoter: Arc<dyn SequenceTuner>,
    rbs: Arc<dyn SequenceTuner>,
}

impl PriorityPlanner {
    /// Create a planner consulting the given tuners for achievable ranges.
    pub fn new(promoter: Arc<dyn SequenceTuner>, rbs: Arc<dyn SequenceTuner>) -> Self {
        Self { promoter, rbs }
    }

    /// Planner over the built-in tuners.
    pub fn with_bounds(bounds: TuningBounds) -> Self {
        Self::new(
            Arc::new(PromoterTuner::new(bounds)),
            Arc::new(RbsTuner::new(bounds)),
        )
    }

    fn range(&self, assignment: &PartAssignment, slot: &Slot, parameter: TunedParameter) -> f64 {
        let Some(part) = assignment.part(slot) else {
            return 1.0;
        };
        let tuner = match parameter.lever() {
            Lever::Promoter => &self.promoter,
            Lever::Rbs => &self.rbs,
        };
        tuner.achievable_range(part, parameter, Direction::Increase)
    }

    fn reassign(&self, ctx: &PlanningContext<'_>, failing: &RowCheck) -> RefinementAction {
        let slot = most_active(&failing.drivers).unwrap_or_else(|| Slot::Reporter(failing.output.clone()));
        let expected = if failing.expected_on { "ON" } else { "OFF" };

        match ctx.assignment.part(&slot) {
            Some(current) => RefinementAction {
                kind: ActionKind::Reassign {
                    slot: slot.clone(),
                    exclude: current.id().clone(),
                },
                rationale: format!(
                    "{} is {:.3} in row {} but should be {}; replace {} in {}",
                    failing.output, failing.level, failing.row, expected, current.label(), slot
                ),
            },
            None => RefinementAction::accept(format!("{} has no part to replace", slot)),
        }
    }

    fn weaken_leak(&self, ctx: &PlanningContext<'_>, check: &ConstraintCheck) -> RefinementAction {
        let Some(slot) = row_check(ctx.diagnosis, check).and_then(|r| most_active(&r.drivers)) else {
            return self.fallback(check);
        };
        let factor = check.bound / check.actual;
        tune(
            slot.clone(),
            TunedParameter::Basal,
            Direction::Decrease,
            factor,
            format!(
                "{} leak {:.3} exceeds {:.3} ({:.1}x); weaken basal activity of {} by x{:.3}",
                check.output, check.actual, check.bound, check.ratio, slot, factor
            ),
        )
    }

    fn raise_on_level(&self, ctx: &PlanningContext<'_>, check: &ConstraintCheck) -> RefinementAction {
        let needed = if check.actual > 0.0 {
            check.bound / check.actual
        } else {
            f64::MAX
        };
        let reporter = Slot::Reporter(check.output.clone());
        let driver = row_check(ctx.diagnosis, check).and_then(|r| most_active(&r.drivers));

        let promoter_range = driver
            .as_ref()
            .map_or(1.0, |slot| self.range(ctx.assignment, slot, TunedParameter::Strength));
        let rbs_range = self.range(ctx.assignment, &reporter, TunedParameter::Translation);

        let promoter_stalled = ctx.previous.is_some_and(|p| {
            !p.improved && p.action.tuning() == Some((Lever::Promoter, Direction::Increase))
        });

        let (slot, parameter, range, why) = match driver {
            Some(slot) if promoter_range >= rbs_range && !promoter_stalled => {
                (slot, TunedParameter::Strength, promoter_range, "promoter strength")
            }
            _ if promoter_stalled => (reporter, TunedParameter::Translation, rbs_range, "RBS translation (promoter increase did not help)"),
            _ => (reporter, TunedParameter::Translation, rbs_range, "RBS translation"),
        };
        let factor = cap(needed, range);

        tune(
            slot.clone(),
            parameter,
            Direction::Increase,
            factor,
            format!(
                "{} ON level {:.3} is below {:.3}; raise {} of {} by x{:.3}",
                check.output, check.actual, check.bound, why, slot, factor
            ),
        )
    }

    fn speed_up(&self, ctx: &PlanningContext<'_>, check: &ConstraintCheck) -> RefinementAction {
        // Gates and the reporter carry kinetic state; sensors respond instantly
        let mut candidates: Vec<Slot> = ctx
            .assignment
            .upstream_slots(&check.output)
            .into_iter()
            .filter(|s| matches!(s, Slot::Gate(_)))
            .collect();
        candidates.push(Slot::Reporter(check.output.clone()));

        let mut slowest: Option<(Slot, f64)> = None;
        for slot in candidates {
            let Some(part) = ctx.assignment.part(&slot) else {
                continue;
            };
            let rate = part.part.expression.rate;
            if slowest.as_ref().map_or(true, |(_, r)| rate < *r) {
                slowest = Some((slot, rate));
            }
        }
        let Some((slot, rate)) = slowest else {
            return self.fallback(check);
        };

        let range = self.range(ctx.assignment, &slot, TunedParameter::Rate);
        let factor = cap(check.actual / check.bound, range);
        tune(
            slot.clone(),
            TunedParameter::Rate,
            Direction::Increase,
            factor,
            format!(
                "{} response time {:.2}h exceeds {:.2}h; speed up {} (rate {:.2}/h) by x{:.3}",
                check.output, check.actual, check.bound, slot, rate, factor
            ),
        )
    }

    fn fallback(&self, check: &ConstraintCheck) -> RefinementAction {
        RefinementAction::accept(format!(
            "{} {} violated but no part can be tuned",
            check.output, check.kind
        ))
    }
}

impl Default for PriorityPlanner {
    fn default() -> Self {
        Self::with_bounds(TuningBounds::default())
    }
}

impl RefinementPlanner for PriorityPlanner {
    fn name(&self) -> &str {
        "priority"
    }

    fn plan(&self, ctx: &PlanningContext<'_>) -> RefinementAction {
        let diagnosis = ctx.diagnosis;

        // Rows are stored row-major, then in output order
        if let Some(failing) = diagnosis.logic_failures().next() {
            return self.reassign(ctx, failing);
        }

        for kind in [ConstraintKind::Leak, ConstraintKind::OnLevel, ConstraintKind::ResponseTime] {
            let Some(check) = worst_violation(diagnosis, kind) else {
                continue;
            };
            let action = match kind {
                ConstraintKind::Leak => self.weaken_leak(ctx, check),
                ConstraintKind::OnLevel => self.raise_on_level(ctx, check),
                ConstraintKind::ResponseTime => self.speed_up(ctx, check),
            };
            tracing::debug!("Planned {} for version {}", action, diagnosis.version);
            return action;
        }

        RefinementAction::accept("every row and constraint is satisfied")
    }
}

fn tune(slot: Slot, parameter: TunedParameter, direction: Direction, factor: f64, rationale: String) -> RefinementAction {
    RefinementAction {
        kind: ActionKind::Tune {
            slot,
            parameter,
            direction,
            factor,
        },
        rationale,
    }
}

/// Limit an increase to the available range, when any range is left.
fn cap(needed: f64, range: f64) -> f64 {
    if range > 1.0 {
        needed.min(range)
    } else {
        needed
    }
}

/// Most active slot; the first in slot order wins ties.
fn most_active(drivers: &BTreeMap<Slot, f64>) -> Option<Slot> {
    let mut best: Option<(&Slot, f64)> = None;
    for (slot, activity) in drivers {
        if best.map_or(true, |(_, a)| *activity > a) {
            best = Some((slot, *activity));
        }
    }
    best.map(|(slot, _)| slot.clone())
}

/// Output names in the order the diagnosis lists them.
fn output_order(diagnosis: &Diagnosis) -> Vec<&str> {
    let mut order: Vec<&str> = Vec::new();
    for row in &diagnosis.rows {
        if !order.contains(&row.output.as_str()) {
            order.push(&row.output);
        }
    }
    order
}

/// Largest relative violation of a kind; earlier outputs win ties.
fn worst_violation(diagnosis: &Diagnosis, kind: ConstraintKind) -> Option<&ConstraintCheck> {
    let order = output_order(diagnosis);
    let position = |output: &str| order.iter().position(|o| *o == output).unwrap_or(usize::MAX);

    let mut worst: Option<&ConstraintCheck> = None;
    for check in diagnosis.violations().filter(|c| c.kind == kind) {
        let replace = match worst {
            None => true,
            Some(current) => {
                let (a, b) = (check.relative_violation(), current.relative_violation());
                a > b || (a == b && position(&check.output) < position(&current.output))
            }
        };
        if replace {
            worst = Some(check);
        }
    }
    worst
}

/// The logic check of the row a constraint was measured on.
fn row_check<'a>(diagnosis: &'a Diagnosis, check: &ConstraintCheck) -> Option<&'a RowCheck> {
    let row = check.row?;
    diagnosis
        .rows
        .iter()
        .find(|r| r.row == row && r.output == check.output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PreviousStep;
    use geneforge_adapters::{CircuitSynthesizer, NetlistSynthesizer, SynthesisRequest};
    use geneforge_catalog::reference_catalog;
    use geneforge_core::{CircuitSpec, Constraint, GateId, RowLevels, SimulationResult, VersionId};
    use geneforge_evaluation::Evaluator;

    async fn not_gate(constraint: Constraint) -> (CircuitSpec, PartAssignment) {
        let spec = CircuitSpec::from_expressions("not", ["A"], &[("GFP", "!A")])
            .unwrap()
            .with_constraint(constraint);
        let assignment = NetlistSynthesizer::new(reference_catalog())
            .synthesize(&SynthesisRequest::new(spec.clone()))
            .await
            .unwrap();
        (spec, assignment)
    }

    /// Diagnosis of a NOT gate with the given GFP levels for A=0 and A=1.
    fn diagnose(spec: &CircuitSpec, assignment: &PartAssignment, low_input: f64, high_input: f64) -> Diagnosis {
        let row = |a: bool, gfp: f64| RowLevels {
            inputs: vec![a],
            outputs: BTreeMap::from([("GFP".to_string(), gfp)]),
            activities: BTreeMap::from([
                (Slot::Sensor("A".into()), if a { 4.4 } else { 0.0013 }),
                (Slot::Gate(GateId::nth(1)), gfp),
            ]),
            time_course: None,
        };
        let sim = SimulationResult::new(VersionId::new(), vec![row(false, low_input), row(true, high_input)]);
        Evaluator::default().diagnose(spec, assignment, &sim)
    }

    #[tokio::test]
    async fn test_leak_weakens_output_promoter() {
        let (spec, assignment) = not_gate(Constraint::MaxLeak { output: None, ratio: 0.1 }).await;
        let diagnosis = diagnose(&spec, &assignment, 20.0, 5.0);
        let action = PriorityPlanner::default().plan(&PlanningContext::new(&diagnosis, &assignment));

        match action.kind {
            ActionKind::Tune { slot, parameter, direction, factor } => {
                assert_eq!(slot, Slot::Gate(GateId::nth(1)));
                assert_eq!(parameter, TunedParameter::Basal);
                assert_eq!(direction, Direction::Decrease);
                assert!((factor - 0.4).abs() < 1e-12);
            }
            other => panic!("expected a tune, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_logic_failure_beats_leak() {
        let (spec, assignment) = not_gate(Constraint::MaxLeak { output: None, ratio: 0.1 }).await;
        // Inverted behavior: both rows wrong and the leak is huge
        let diagnosis = diagnose(&spec, &assignment, 1.0, 20.0);
        assert!(diagnosis.violations().count() > 0);

        let action = PriorityPlanner::default().plan(&PlanningContext::new(&diagnosis, &assignment));
        match action.kind {
            ActionKind::Reassign { slot, exclude } => {
                assert_eq!(slot, Slot::Gate(GateId::nth(1)));
                assert_eq!(&exclude, assignment.part(&slot).unwrap().id());
            }
            other => panic!("expected a reassignment, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_planning_is_deterministic() {
        let (spec, assignment) = not_gate(Constraint::MaxLeak { output: None, ratio: 0.1 }).await;
        let planner = PriorityPlanner::default();
        let a = planner.plan(&PlanningContext::new(&diagnose(&spec, &assignment, 20.0, 5.0), &assignment));
        let b = planner.plan(&PlanningContext::new(&diagnose(&spec, &assignment, 20.0, 5.0), &assignment));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_low_on_level_prefers_wider_lever() {
        let (spec, assignment) = not_gate(Constraint::MinOnLevel { output: None, level: 40.0 }).await;
        let diagnosis = diagnose(&spec, &assignment, 20.0, 0.1);
        let planner = PriorityPlanner::default();

        // Both levers have 10x headroom; the promoter wins the tie
        let first = planner.plan(&PlanningContext::new(&diagnosis, &assignment));
        assert_eq!(first.tuning(), Some((Lever::Promoter, Direction::Increase)));
        match &first.kind {
            ActionKind::Tune { factor, .. } => assert!((factor - 2.0).abs() < 1e-12),
            other => panic!("expected a tune, got {:?}", other),
        }

        // A promoter increase that did not help switches to the RBS
        let previous = PreviousStep { action: first, improved: false };
        let second = planner.plan(&PlanningContext::new(&diagnosis, &assignment).with_previous(Some(&previous)));
        assert_eq!(second.tuning(), Some((Lever::Rbs, Direction::Increase)));
        assert_eq!(second.slot(), Some(&Slot::Reporter("GFP".into())));
    }

    #[tokio::test]
    async fn test_response_time_targets_slowest_stage() {
        let (spec, assignment) = not_gate(Constraint::MinOnLevel { output: None, level: 1.0 }).await;
        let mut diagnosis = diagnose(&spec, &assignment, 20.0, 0.1);
        diagnosis.constraints = vec![ConstraintCheck::new(ConstraintKind::ResponseTime, "GFP", 4.0, 2.0, Some(0))];

        let action = PriorityPlanner::default().plan(&PlanningContext::new(&diagnosis, &assignment));
        // S4_SrpR (0.7/h) is slower than the GFP reporter (0.8/h)
        assert_eq!(action.slot(), Some(&Slot::Gate(GateId::nth(1))));
        match action.kind {
            ActionKind::Tune { parameter, factor, .. } => {
                assert_eq!(parameter, TunedParameter::Rate);
                assert!((factor - 2.0).abs() < 1e-12);
            }
            other => panic!("expected a tune, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_passing_design_is_accepted() {
        let (spec, assignment) = not_gate(Constraint::MaxLeak { output: None, ratio: 0.1 }).await;
        let diagnosis = diagnose(&spec, &assignment, 20.0, 0.5);
        assert!(diagnosis.is_passing());
        assert!(PriorityPlanner::default().plan(&PlanningContext::new(&diagnosis, &assignment)).is_accept());
    }
}
