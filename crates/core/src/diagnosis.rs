//! Diagnosis - evaluation of one SimulationResult against a CircuitSpec.

use crate::assignment::Slot;
use crate::id::{SimulationId, VersionId};
use crate::spec::ConstraintKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Relative violations are capped so unreachable targets still rank.
pub const MAX_RELATIVE_VIOLATION: f64 = 1.0e6;

/// Overall classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Logic correct and every constraint satisfied
    Pass,
    /// At least one logic failure or constraint violation
    Fail,
    /// The result does not carry enough signal to decide
    Inconclusive,
}

/// Logic check of one output in one truth table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCheck {
    /// Truth table row index
    pub row: usize,
    /// Input values
    pub inputs: Vec<bool>,
    /// Output name
    pub output: String,
    /// Expected state
    pub expected_on: bool,
    /// Simulated level
    pub level: f64,
    /// Classified state
    pub observed_on: bool,
    /// Activity of every promoter driving this output in this row
    pub drivers: BTreeMap<Slot, f64>,
}

impl RowCheck {
    /// Whether the classification matches the truth table.
    pub fn is_correct(&self) -> bool {
        self.expected_on == self.observed_on
    }
}

/// Check of one quantitative constraint on one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintCheck {
    /// Constraint category
    pub kind: ConstraintKind,
    /// Output name
    pub output: String,
    /// Measured metric
    pub actual: f64,
    /// Declared bound
    pub bound: f64,
    /// Amount beyond the bound, 0 when satisfied
    pub violation: f64,
    /// `actual / bound`
    pub ratio: f64,
    /// Row that determined the metric
    pub row: Option<usize>,
}

impl ConstraintCheck {
    /// Build a check, computing violation and ratio.
    pub fn new(kind: ConstraintKind, output: impl Into<String>, actual: f64, bound: f64, row: Option<usize>) -> Self {
        let violation = if kind.is_upper_bound() {
            (actual - bound).max(0.0)
        } else {
            (bound - actual).max(0.0)
        };
        Self {
            kind,
            output: output.into(),
            actual,
            bound,
            violation,
            ratio: actual / bound,
            row,
        }
    }

    /// Whether the bound is violated.
    pub fn is_violated(&self) -> bool {
        self.violation > 0.0
    }

    /// Violation relative to the bound, capped.
    pub fn relative_violation(&self) -> f64 {
        (self.violation / self.bound).min(MAX_RELATIVE_VIOLATION)
    }
}

/// Evaluation of one SimulationResult.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// Version evaluated
    pub version: VersionId,
    /// Simulation evaluated
    pub simulation: SimulationId,
    /// Overall verdict
    pub verdict: Verdict,
    /// ON threshold used per output
    pub thresholds: BTreeMap<String, f64>,
    /// Logic checks, row-major then output order
    pub rows: Vec<RowCheck>,
    /// Constraint checks in spec order
    pub constraints: Vec<ConstraintCheck>,
    /// Reasons for an inconclusive verdict
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Ranking key for design versions. Lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DesignScore {
    /// Number of wrong row classifications
    pub logic_failures: usize,
    /// Sum of relative constraint violations
    pub total_violation: f64,
}

impl DesignScore {
    /// Strictly better than `other`.
    pub fn is_better_than(&self, other: &DesignScore) -> bool {
        match self.logic_failures.cmp(&other.logic_failures) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => self.total_violation < other.total_violation,
        }
    }
}

impl Diagnosis {
    /// Whether the design meets its spec.
    pub fn is_passing(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    /// Rows whose classification is wrong.
    pub fn logic_failures(&self) -> impl Iterator<Item = &RowCheck> {
        self.rows.iter().filter(|r| !r.is_correct())
    }

    /// Violated constraints.
    pub fn violations(&self) -> impl Iterator<Item = &ConstraintCheck> {
        self.constraints.iter().filter(|c| c.is_violated())
    }

    /// Number of logic failures plus violated constraints.
    pub fn violation_count(&self) -> usize {
        self.logic_failures().count() + self.violations().count()
    }

    /// Sum of relative constraint violations.
    pub fn total_violation(&self) -> f64 {
        self.violations().map(ConstraintCheck::relative_violation).sum()
    }

    /// Ranking key.
    pub fn score(&self) -> DesignScore {
        DesignScore {
            logic_failures: self.logic_failures().count(),
            total_violation: self.total_violation(),
        }
    }
}
