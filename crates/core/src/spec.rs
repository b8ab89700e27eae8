//! Circuit specification - the target behavior a design session works toward.

use crate::error::SpecError;
use crate::expr::LogicExpr;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default host organism.
pub const DEFAULT_ORGANISM: &str = "E. coli";

/// Default part library identifier.
pub const DEFAULT_LIBRARY: &str = "Eco1C1G1T1";

/// Largest number of inputs accepted (the truth table grows as 2^n).
pub const MAX_INPUTS: usize = 8;

/// Target logic and quantitative behavior of a genetic circuit.
///
/// Immutable once a design session has started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSpec {
    /// Circuit name
    pub name: String,

    /// Host organism used to scope the part catalog
    #[serde(default = "default_organism")]
    pub organism: String,

    /// Part library identifier
    #[serde(default = "default_library")]
    pub library: String,

    /// Ordered input signal names
    pub inputs: Vec<String>,

    /// Ordered output reporter names
    pub outputs: Vec<String>,

    /// Expected ON/OFF per output for each input combination
    pub truth_table: Vec<TruthRow>,

    /// Quantitative constraints
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

fn default_organism() -> String {
    DEFAULT_ORGANISM.to_string()
}

fn default_library() -> String {
    DEFAULT_LIBRARY.to_string()
}

/// One truth table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruthRow {
    /// Input values, in `CircuitSpec::inputs` order
    pub inputs: Vec<bool>,

    /// Expected output states, in `CircuitSpec::outputs` order
    pub outputs: Vec<bool>,
}

/// A quantitative constraint. `output: None` applies to every output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    /// OFF level / ON level must stay below `ratio`
    MaxLeak {
        /// Output the constraint applies to
        #[serde(default)]
        output: Option<String>,
        /// Upper bound on the leak ratio
        ratio: f64,
    },

    /// Lowest ON level must reach `level`
    MinOnLevel {
        /// Output the constraint applies to
        #[serde(default)]
        output: Option<String>,
        /// Lower bound on the ON level
        level: f64,
    },

    /// Time to reach the ON threshold must stay below `hours`
    MaxResponseTime {
        /// Output the constraint applies to
        #[serde(default)]
        output: Option<String>,
        /// Upper bound in hours
        hours: f64,
    },
}

/// Constraint category. Declaration order is the refinement priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// OFF-state leak
    Leak,
    /// ON-state level
    OnLevel,
    /// Response time
    ResponseTime,
}

impl ConstraintKind {
    /// Whether the bound is an upper bound (`actual <= bound`).
    pub fn is_upper_bound(self) -> bool {
        !matches!(self, ConstraintKind::OnLevel)
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintKind::Leak => write!(f, "leak"),
            ConstraintKind::OnLevel => write!(f, "on-level"),
            ConstraintKind::ResponseTime => write!(f, "response-time"),
        }
    }
}

impl Constraint {
    /// Constraint category.
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::MaxLeak { .. } => ConstraintKind::Leak,
            Constraint::MinOnLevel { .. } => ConstraintKind::OnLevel,
            Constraint::MaxResponseTime { .. } => ConstraintKind::ResponseTime,
        }
    }

    /// The declared bound.
    pub fn bound(&self) -> f64 {
        match self {
            Constraint::MaxLeak { ratio, .. } => *ratio,
            Constraint::MinOnLevel { level, .. } => *level,
            Constraint::MaxResponseTime { hours, .. } => *hours,
        }
    }

    /// Targeted output, if restricted to one.
    pub fn output(&self) -> Option<&str> {
        match self {
            Constraint::MaxLeak { output, .. }
            | Constraint::MinOnLevel { output, .. }
            | Constraint::MaxResponseTime { output, .. } => output.as_deref(),
        }
    }

    /// Whether this constraint applies to `output`.
    pub fn applies_to(&self, output: &str) -> bool {
        self.output().map_or(true, |o| o == output)
    }
}

impl CircuitSpec {
    /// Create an empty spec with the given signals.
    pub fn new<I, O>(name: impl Into<String>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            name: name.into(),
            organism: default_organism(),
            library: default_library(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            truth_table: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Build the full truth table from one expression per output.
    pub fn from_expressions<I>(
        name: impl Into<String>,
        inputs: I,
        expressions: &[(&str, &str)],
    ) -> Result<Self, SpecError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
        if inputs.len() > MAX_INPUTS {
            return Err(SpecError::Invalid(format!(
                "{} inputs exceeds the maximum of {}",
                inputs.len(),
                MAX_INPUTS
            )));
        }

        let parsed = expressions
            .iter()
            .map(|(_, src)| LogicExpr::parse(src, &inputs))
            .collect::<Result<Vec<_>, _>>()?;

        let mut spec = Self::new(name, inputs, expressions.iter().map(|(o, _)| *o));
        spec.truth_table = all_combinations(spec.inputs.len())
            .into_iter()
            .map(|combo| TruthRow {
                outputs: parsed.iter().map(|e| e.eval(&combo)).collect(),
                inputs: combo,
            })
            .collect();

        spec.validate()?;
        Ok(spec)
    }

    /// Set the host organism.
    pub fn with_organism(mut self, organism: impl Into<String>) -> Self {
        self.organism = organism.into();
        self
    }

    /// Set the part library identifier.
    pub fn with_library(mut self, library: impl Into<String>) -> Self {
        self.library = library.into();
        self
    }

    /// Append a truth table row.
    pub fn with_row(mut self, inputs: &[bool], outputs: &[bool]) -> Self {
        self.truth_table.push(TruthRow {
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        });
        self
    }

    /// Append a quantitative constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Check structural consistency.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.inputs.is_empty() {
            return Err(SpecError::Invalid("no input signals".to_string()));
        }
        if self.outputs.is_empty() {
            return Err(SpecError::Invalid("no output reporters".to_string()));
        }
        if self.inputs.len() > MAX_INPUTS {
            return Err(SpecError::Invalid(format!("more than {} inputs", MAX_INPUTS)));
        }

        let mut names = HashSet::new();
        for name in self.inputs.iter().chain(self.outputs.iter()) {
            if name.trim().is_empty() {
                return Err(SpecError::Invalid("empty signal name".to_string()));
            }
            if !names.insert(name.as_str()) {
                return Err(SpecError::Invalid(format!("duplicate signal name '{}'", name)));
            }
        }

        if self.truth_table.is_empty() {
            return Err(SpecError::Invalid("empty truth table".to_string()));
        }

        let mut seen = HashSet::new();
        for (i, row) in self.truth_table.iter().enumerate() {
            if row.inputs.len() != self.inputs.len() || row.outputs.len() != self.outputs.len() {
                return Err(SpecError::Invalid(format!("row {} has the wrong width", i)));
            }
            if !seen.insert(row.inputs.clone()) {
                return Err(SpecError::Invalid(format!(
                    "duplicate input combination {}",
                    self.format_inputs(&row.inputs)
                )));
            }
        }

        for c in &self.constraints {
            let bound = c.bound();
            if !bound.is_finite() || bound <= 0.0 {
                return Err(SpecError::Invalid(format!("{} bound must be positive", c.kind())));
            }
            if let Some(output) = c.output() {
                if !self.outputs.iter().any(|o| o == output) {
                    return Err(SpecError::UnknownSignal(output.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Position of an output by name.
    pub fn output_index(&self, output: &str) -> Option<usize> {
        self.outputs.iter().position(|o| o == output)
    }

    /// Input combinations in truth table order.
    pub fn combinations(&self) -> Vec<Vec<bool>> {
        self.truth_table.iter().map(|r| r.inputs.clone()).collect()
    }

    /// Whether any constraint needs a time course to evaluate.
    pub fn needs_time_course(&self) -> bool {
        self.constraints
            .iter()
            .any(|c| c.kind() == ConstraintKind::ResponseTime)
    }

    /// Constraints that apply to `output`.
    pub fn constraints_for<'a>(&'a self, output: &'a str) -> impl Iterator<Item = &'a Constraint> + 'a {
        self.constraints.iter().filter(move |c| c.applies_to(output))
    }

    /// Render an input combination as `A=0,B=1`.
    pub fn format_inputs(&self, values: &[bool]) -> String {
        self.inputs
            .iter()
            .zip(values)
            .map(|(name, v)| format!("{}={}", name, u8::from(*v)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// All 2^n combinations, first input as the most significant bit.
pub fn all_combinations(n: usize) -> Vec<Vec<bool>> {
    (0..(1usize << n))
        .map(|bits| (0..n).map(|i| bits & (1 << (n - 1 - i)) != 0).collect())
        .collect()
}
