//! Controller configuration.

use crate::error::ControllerError;
use geneforge_adapters::{CommandSpec, SimulationSettings, TuningBounds};
use geneforge_evaluation::EvaluationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the iteration controller.
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Refinement iterations before giving up
    pub max_iterations: u32,
    /// Bound on every adapter call, in seconds
    pub adapter_timeout_secs: f64,
    /// Evaluator thresholds
    pub evaluation: EvaluationConfig,
    /// Built-in simulator settings
    pub simulation: SimulationSettings,
    /// Built-in tuner bounds
    pub tuning: TuningBounds,
    /// Sessions run at once by a session pool
    pub max_concurrent_sessions: usize,
    /// Versions without significant improvement before a session stops;
    /// unset runs until the iteration budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stagnation_limit: Option<u32>,
    /// Fraction of the best total violation a version must remove to count
    /// as an improvement
    pub min_improvement: f64,
    /// External synthesizer replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesizer_command: Option<CommandSpec>,
    /// External simulator replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulator_command: Option<CommandSpec>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            adapter_timeout_secs: 30.0,
            evaluation: EvaluationConfig::default(),
            simulation: SimulationSettings::default(),
            tuning: TuningBounds::default(),
            max_concurrent_sessions: 4,
            stagnation_limit: None,
            min_improvement: 0.0,
            synthesizer_command: None,
            simulator_command: None,
        }
    }
}

impl ControllerConfig {
    /// Load from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ControllerError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::info!("Loaded controller config from {}", path.display());
        Ok(config)
    }

    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> Result<(), ControllerError> {
        if !(self.adapter_timeout_secs.is_finite() && self.adapter_timeout_secs > 0.0) {
            return Err(ControllerError::Config("adapter_timeout_secs must be positive".into()));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(ControllerError::Config("max_concurrent_sessions must be at least 1".into()));
        }
        let fraction = self.evaluation.on_threshold_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ControllerError::Config("on_threshold_fraction must be in (0, 1)".into()));
        }
        if !(self.tuning.min_scale > 0.0 && self.tuning.min_scale <= 1.0 && self.tuning.max_scale >= 1.0) {
            return Err(ControllerError::Config("tuning bounds must bracket 1.0".into()));
        }
        if self.stagnation_limit == Some(0) {
            return Err(ControllerError::Config("stagnation_limit must be at least 1".into()));
        }
        if !(self.min_improvement.is_finite() && (0.0..1.0).contains(&self.min_improvement)) {
            return Err(ControllerError::Config("min_improvement must be in [0, 1)".into()));
        }
        Ok(())
    }

    /// Adapter call bound.
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.adapter_timeout_secs)
    }

    /// Set the iteration budget.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the adapter call bound.
    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Set evaluator thresholds.
    pub fn with_evaluation(mut self, evaluation: EvaluationConfig) -> Self {
        self.evaluation = evaluation;
        self
    }

    /// Set simulator settings.
    pub fn with_simulation(mut self, simulation: SimulationSettings) -> Self {
        self.simulation = simulation;
        self
    }

    /// Set tuner bounds.
    pub fn with_tuning(mut self, tuning: TuningBounds) -> Self {
        self.tuning = tuning;
        self
    }

    /// Set the session pool width.
    pub fn with_max_concurrent_sessions(mut self, max: usize) -> Self {
        self.max_concurrent_sessions = max;
        self
    }

    /// Stop after `limit` versions that improve the best score by less than
    /// `min_improvement` of its total violation.
    pub fn with_stagnation(mut self, limit: u32, min_improvement: f64) -> Self {
        self.stagnation_limit = Some(limit);
        self.min_improvement = min_improvement;
        self
    }

    /// Use an external synthesizer command.
    pub fn with_synthesizer_command(mut self, command: CommandSpec) -> Self {
        self.synthesizer_command = Some(command);
        self
    }

    /// Use an external simulator command.
    pub fn with_simulator_command(mut self, command: CommandSpec) -> Self {
        self.simulator_command = Some(command);
        self
    }
}
