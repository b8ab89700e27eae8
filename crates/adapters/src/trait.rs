//! Adapter abstractions.

use async_trait::async_trait;
use geneforge_core::{
    AssignedPart, CircuitSpec, DesignFailure, Direction, Lever, PartAssignment, PartId,
    SimulationResult, Slot, TunedParameter, VersionId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Errors reported by adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// No assignment realizes the request
    #[error("unsatisfiable: {0}")]
    Unsatisfiable(String),

    /// The model did not settle
    #[error("nonconvergent: {0}")]
    Nonconvergent(String),

    /// The model is structurally invalid
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Tuning request lies outside the library bounds
    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    /// Call exceeded its time bound
    #[error("{adapter} timed out after {seconds:.1}s")]
    Timeout {
        /// Adapter name
        adapter: String,
        /// Bound in seconds
        seconds: f64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background computation was cancelled or panicked
    #[error("task failed: {0}")]
    Task(String),

    /// External command failed
    #[error("command '{program}' failed (exit {status:?}): {stderr}")]
    Command {
        /// Program that was run
        program: String,
        /// Exit code, if any
        status: Option<i32>,
        /// Captured standard error
        stderr: String,
    },
}

impl AdapterError {
    /// Session failure this error is recorded as.
    pub fn into_failure(self) -> DesignFailure {
        match self {
            AdapterError::Unsatisfiable(msg) => DesignFailure::SynthesisUnsatisfiable(msg),
            AdapterError::Nonconvergent(msg) => DesignFailure::SimulationNonconvergent(msg),
            AdapterError::InvalidModel(msg) => DesignFailure::InvalidModel(msg),
            AdapterError::Timeout { adapter, seconds } => DesignFailure::AdapterTimeout { adapter, seconds },
            other => DesignFailure::Adapter(other.to_string()),
        }
    }
}

/// Input to a synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Target logic
    pub spec: CircuitSpec,

    /// Part library identifier
    pub library: String,

    /// Assignment to start from; slots whose part is not excluded are kept
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<PartAssignment>,

    /// Parts that must not be placed in a slot
    #[serde(default)]
    pub exclusions: BTreeMap<Slot, BTreeSet<PartId>>,
}

impl SynthesisRequest {
    /// Fresh synthesis for a spec.
    pub fn new(spec: CircuitSpec) -> Self {
        Self {
            library: spec.library.clone(),
            spec,
            base: None,
            exclusions: BTreeMap::new(),
        }
    }

    /// Start from an existing assignment.
    pub fn with_base(mut self, base: PartAssignment) -> Self {
        self.base = Some(base);
        self
    }

    /// Add exclusions.
    pub fn with_exclusions(mut self, exclusions: BTreeMap<Slot, BTreeSet<PartId>>) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Whether `part` is excluded from `slot`.
    pub fn is_excluded(&self, slot: &Slot, part: &PartId) -> bool {
        self.exclusions.get(slot).is_some_and(|ids| ids.contains(part))
    }
}

/// Input to a simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Version being simulated
    pub version: VersionId,

    /// Assignment of that version
    pub assignment: PartAssignment,

    /// Input signal names, in row order
    pub inputs: Vec<String>,

    /// Input combinations to evaluate
    pub rows: Vec<Vec<bool>>,

    /// Also integrate a time course per row
    #[serde(default)]
    pub time_course: bool,
}

/// Input to a tuner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuneRequest {
    /// Parameter to change
    pub parameter: TunedParameter,
    /// Direction of the change
    pub direction: Direction,
    /// Requested multiplicative factor
    pub factor: f64,
}

/// Circuit synthesizer.
#[async_trait]
pub trait CircuitSynthesizer: Send + Sync {
    /// Adapter name.
    fn name(&self) -> &str;

    /// Produce a complete assignment.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<PartAssignment, AdapterError>;
}

/// Circuit simulator.
#[async_trait]
pub trait CircuitSimulator: Send + Sync {
    /// Adapter name.
    fn name(&self) -> &str;

    /// Simulate every requested row.
    async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult, AdapterError>;
}

/// Promoter or RBS tuner.
#[async_trait]
pub trait SequenceTuner: Send + Sync {
    /// Adapter name.
    fn name(&self) -> &str;

    /// Lever this tuner moves.
    fn lever(&self) -> Lever;

    /// Largest fold change still available for `parameter` in `direction`
    /// (1.0 when the part is already at the bound).
    fn achievable_range(&self, part: &AssignedPart, parameter: TunedParameter, direction: Direction) -> f64;

    /// Derive a tuned variant of `part`.
    async fn tune(&self, part: &AssignedPart, request: &TuneRequest) -> Result<AssignedPart, AdapterError>;
}
