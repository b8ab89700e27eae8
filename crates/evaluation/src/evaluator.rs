//! Performance evaluator.

use geneforge_core::{
    CircuitSpec, Constraint, ConstraintCheck, ConstraintKind, Diagnosis, PartAssignment, RowCheck,
    RowLevels, SimulationResult, Verdict,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Evaluation thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// A level at or above this fraction of the output's maximum is ON
    pub on_threshold_fraction: f64,
    /// Outputs whose maximum stays below this carry no usable signal
    pub min_signal: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            on_threshold_fraction: 0.5,
            min_signal: 1e-6,
        }
    }
}

/// Compares simulated behavior with the spec.
///
/// Evaluation has no side effects and reads no clock, so the same inputs
/// always produce the same [`Diagnosis`].
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    config: EvaluationConfig,
}

/// Rows of one output with their levels, split by expected state.
struct OutputRows<'a> {
    on: Vec<(usize, &'a RowLevels, f64)>,
    off: Vec<(usize, &'a RowLevels, f64)>,
}

impl Evaluator {
    /// Create an evaluator.
    pub fn new(config: EvaluationConfig) -> Self {
        Self { config }
    }

    /// Thresholds in use.
    pub fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Evaluate a simulation and attribute each row to the promoters driving
    /// its output in `assignment`.
    pub fn diagnose(&self, spec: &CircuitSpec, assignment: &PartAssignment, result: &SimulationResult) -> Diagnosis {
        let mut diagnosis = self.evaluate(spec, result);
        for check in &mut diagnosis.rows {
            let Some(levels) = result.row(&check.inputs) else {
                continue;
            };
            check.drivers = assignment
                .driver_slots(&check.output)
                .into_iter()
                .map(|slot| {
                    let activity = levels.activities.get(&slot).copied().unwrap_or(0.0);
                    (slot, activity)
                })
                .collect();
        }
        diagnosis
    }

    /// Evaluate a simulation against the spec.
    pub fn evaluate(&self, spec: &CircuitSpec, result: &SimulationResult) -> Diagnosis {
        let mut notes = Vec::new();

        // Truth table rows matched to simulated rows
        let mut matched: Vec<Option<&RowLevels>> = Vec::with_capacity(spec.truth_table.len());
        for row in &spec.truth_table {
            let levels = result.row(&row.inputs);
            if levels.is_none() {
                notes.push(format!("no simulated row for {}", spec.format_inputs(&row.inputs)));
            }
            matched.push(levels);
        }

        let level_of = |levels: Option<&RowLevels>, output: &str| -> Option<f64> {
            levels.and_then(|l| l.outputs.get(output).copied())
        };

        let mut thresholds = BTreeMap::new();
        for output in &spec.outputs {
            let max = matched
                .iter()
                .filter_map(|l| level_of(*l, output))
                .fold(0.0f64, f64::max);
            if max < self.config.min_signal || !max.is_finite() {
                notes.push(format!("{} maximum level {:e} carries no usable signal", output, max));
            }
            thresholds.insert(output.clone(), self.config.on_threshold_fraction * max);
        }

        let mut rows = Vec::new();
        for (r, (row, levels)) in spec.truth_table.iter().zip(&matched).enumerate() {
            for (o, output) in spec.outputs.iter().enumerate() {
                let level = match level_of(*levels, output) {
                    Some(level) => level,
                    None => {
                        if levels.is_some() {
                            notes.push(format!("no level for {} in row {}", output, r));
                        }
                        0.0
                    }
                };
                let threshold = thresholds.get(output).copied().unwrap_or(0.0);
                rows.push(RowCheck {
                    row: r,
                    inputs: row.inputs.clone(),
                    output: output.clone(),
                    expected_on: row.outputs[o],
                    level,
                    observed_on: level >= threshold,
                    drivers: BTreeMap::new(),
                });
            }
        }

        let mut constraints = Vec::new();
        for constraint in &spec.constraints {
            for output in spec.outputs.iter().filter(|o| constraint.applies_to(o)) {
                let split = split_rows(spec, &matched, output);
                let threshold = thresholds.get(output).copied().unwrap_or(0.0);
                match self.check(constraint, output, &split, threshold, result) {
                    Ok(Some(check)) => constraints.push(check),
                    Ok(None) => {}
                    Err(note) => notes.push(note),
                }
            }
        }

        let verdict = if !notes.is_empty() {
            Verdict::Inconclusive
        } else if rows.iter().any(|r| !r.is_correct()) || constraints.iter().any(|c| c.is_violated()) {
            Verdict::Fail
        } else {
            Verdict::Pass
        };
        tracing::debug!(
            "Evaluated simulation {} of version {}: {:?}",
            result.id,
            result.version,
            verdict
        );

        Diagnosis {
            version: result.version,
            simulation: result.id,
            verdict,
            thresholds,
            rows,
            constraints,
            notes,
        }
    }

    fn check(
        &self,
        constraint: &Constraint,
        output: &str,
        rows: &OutputRows<'_>,
        threshold: f64,
        result: &SimulationResult,
    ) -> Result<Option<ConstraintCheck>, String> {
        let bound = constraint.bound();
        let weakest_on = rows
            .on
            .iter()
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map(|(r, _, level)| (*r, *level));

        match constraint.kind() {
            ConstraintKind::Leak => {
                let worst_off = rows
                    .off
                    .iter()
                    .max_by(|a, b| a.2.total_cmp(&b.2).then_with(|| b.0.cmp(&a.0)))
                    .map(|(r, _, level)| (*r, *level));
                // A constant output has no leak to measure
                let (Some((off_row, off)), Some((_, on))) = (worst_off, weakest_on) else {
                    return Ok(None);
                };
                let leak = if on > 0.0 {
                    off / on
                } else if off > 0.0 {
                    f64::MAX
                } else {
                    0.0
                };
                Ok(Some(ConstraintCheck::new(ConstraintKind::Leak, output, leak, bound, Some(off_row))))
            }
            ConstraintKind::OnLevel => Ok(weakest_on.map(|(row, level)| {
                ConstraintCheck::new(ConstraintKind::OnLevel, output, level, bound, Some(row))
            })),
            ConstraintKind::ResponseTime => {
                if !result.has_time_course() {
                    return Err(format!("response time of {} needs a time course", output));
                }
                let mut worst: Option<(usize, f64)> = None;
                for (r, levels, _) in &rows.on {
                    let reached = levels
                        .time_course
                        .as_ref()
                        .and_then(|tc| tc.time_to_reach(output, threshold))
                        .unwrap_or(f64::MAX);
                    if worst.map_or(true, |(_, t)| reached > t) {
                        worst = Some((*r, reached));
                    }
                }
                Ok(worst.map(|(row, t)| {
                    ConstraintCheck::new(ConstraintKind::ResponseTime, output, t, bound, Some(row))
                }))
            }
        }
    }
}

fn split_rows<'a>(spec: &CircuitSpec, matched: &[Option<&'a RowLevels>], output: &str) -> OutputRows<'a> {
    let mut split = OutputRows {
        on: Vec::new(),
        off: Vec::new(),
    };
    let Some(o) = spec.output_index(output) else {
        return split;
    };
    for (r, (row, levels)) in spec.truth_table.iter().zip(matched).enumerate() {
        let Some(levels) = levels else { continue };
        let Some(level) = levels.outputs.get(output).copied() else {
            continue;
        };
        if row.outputs[o] {
            split.on.push((r, levels, level));
        } else {
            split.off.push((r, levels, level));
        }
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use geneforge_core::{
        GateId, Netlist, OutputWiring, Signal, Slot, TimeCourse, VersionId, MAX_RELATIVE_VIOLATION,
    };

    fn not_spec(leak: Option<f64>) -> CircuitSpec {
        let spec = CircuitSpec::from_expressions("not", ["A"], &[("GFP", "!A")]).unwrap();
        match leak {
            Some(ratio) => spec.with_constraint(Constraint::MaxLeak { output: None, ratio }),
            None => spec,
        }
    }

    fn result(levels: &[(bool, f64)]) -> SimulationResult {
        let rows = levels
            .iter()
            .map(|(a, gfp)| RowLevels {
                inputs: vec![*a],
                outputs: BTreeMap::from([("GFP".to_string(), *gfp)]),
                activities: BTreeMap::from([(Slot::Gate(GateId::nth(1)), *gfp)]),
                time_course: None,
            })
            .collect();
        SimulationResult::new(VersionId::new(), rows)
    }

    #[test]
    fn test_clean_not_gate_passes() {
        let diagnosis = Evaluator::default().evaluate(&not_spec(Some(0.1)), &result(&[(false, 20.0), (true, 0.5)]));
        assert_eq!(diagnosis.verdict, Verdict::Pass);
        assert_eq!(diagnosis.thresholds["GFP"], 10.0);
        assert_eq!(diagnosis.violation_count(), 0);
    }

    #[test]
    fn test_leaky_not_gate() {
        let diagnosis = Evaluator::default().evaluate(&not_spec(Some(0.1)), &result(&[(false, 20.0), (true, 5.0)]));
        assert_eq!(diagnosis.verdict, Verdict::Fail);
        assert_eq!(diagnosis.logic_failures().count(), 0);

        let leak = &diagnosis.constraints[0];
        assert_eq!(leak.kind, ConstraintKind::Leak);
        assert!((leak.actual - 0.25).abs() < 1e-12);
        assert!((leak.ratio - 2.5).abs() < 1e-12);
        assert!((leak.violation - 0.15).abs() < 1e-12);
        assert_eq!(leak.row, Some(1));
    }

    #[test]
    fn test_logic_failure_detected() {
        let diagnosis = Evaluator::default().evaluate(&not_spec(None), &result(&[(false, 1.0), (true, 20.0)]));
        assert_eq!(diagnosis.verdict, Verdict::Fail);
        let failures: Vec<usize> = diagnosis.logic_failures().map(|r| r.row).collect();
        assert_eq!(failures, vec![0, 1]);
    }

    #[test]
    fn test_no_signal_is_inconclusive() {
        let diagnosis = Evaluator::default().evaluate(&not_spec(None), &result(&[(false, 0.0), (true, 0.0)]));
        assert_eq!(diagnosis.verdict, Verdict::Inconclusive);
        assert!(!diagnosis.notes.is_empty());
    }

    #[test]
    fn test_missing_row_is_inconclusive() {
        let diagnosis = Evaluator::default().evaluate(&not_spec(None), &result(&[(false, 20.0)]));
        assert_eq!(diagnosis.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn test_response_time_needs_time_course() {
        let spec = not_spec(None).with_constraint(Constraint::MaxResponseTime { output: None, hours: 2.0 });
        let diagnosis = Evaluator::default().evaluate(&spec, &result(&[(false, 20.0), (true, 0.5)]));
        assert_eq!(diagnosis.verdict, Verdict::Inconclusive);
    }

    #[test]
    fn test_response_time_measured_on_worst_on_row() {
        let spec = not_spec(None).with_constraint(Constraint::MaxResponseTime { output: None, hours: 2.0 });
        let mut sim = result(&[(false, 20.0), (true, 0.5)]);
        for row in &mut sim.rows {
            let level = row.outputs["GFP"];
            row.time_course = Some(TimeCourse {
                times: vec![0.0, 1.0, 2.0, 3.0],
                outputs: BTreeMap::from([("GFP".to_string(), vec![0.0, 0.3 * level, 0.6 * level, level])]),
            });
        }
        let diagnosis = Evaluator::default().evaluate(&spec, &sim);
        let check = &diagnosis.constraints[0];
        assert_eq!(check.actual, 2.0);
        assert!(!check.is_violated());

        // Never reaching the threshold is the largest possible violation
        for row in &mut sim.rows {
            if let Some(tc) = row.time_course.as_mut() {
                tc.outputs.insert("GFP".to_string(), vec![0.0; 4]);
            }
        }
        let diagnosis = Evaluator::default().evaluate(&spec, &sim);
        assert_eq!(diagnosis.constraints[0].relative_violation(), MAX_RELATIVE_VIOLATION);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let spec = not_spec(Some(0.1));
        let sim = result(&[(false, 20.0), (true, 5.0)]);
        let evaluator = Evaluator::default();
        let a = evaluator.evaluate(&spec, &sim);
        let b = evaluator.evaluate(&spec, &sim);
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_diagnose_attributes_driver_activity() {
        let assignment = PartAssignment {
            netlist: Netlist {
                gates: vec![],
                outputs: vec![OutputWiring { output: "GFP".into(), drivers: vec![Signal::Gate(GateId::nth(1))] }],
            },
            parts: BTreeMap::new(),
        };
        let diagnosis = Evaluator::default().diagnose(&not_spec(None), &assignment, &result(&[(false, 20.0), (true, 5.0)]));
        assert_eq!(diagnosis.rows[1].drivers[&Slot::Gate(GateId::nth(1))], 5.0);
    }
}
