//! Simulation results - output levels per input combination.

use crate::assignment::Slot;
use crate::id::{SimulationId, VersionId};
use crate::Time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sampled trajectory for one input combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeCourse {
    /// Sample times in hours
    pub times: Vec<f64>,
    /// Output level per sample, by output name
    pub outputs: BTreeMap<String, Vec<f64>>,
}

impl TimeCourse {
    /// First sample time at which `output` reaches `threshold`.
    pub fn time_to_reach(&self, output: &str, threshold: f64) -> Option<f64> {
        let series = self.outputs.get(output)?;
        self.times
            .iter()
            .zip(series)
            .find(|(_, level)| **level >= threshold)
            .map(|(t, _)| *t)
    }
}

/// Levels for one input combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowLevels {
    /// Input values in spec order
    pub inputs: Vec<bool>,

    /// Steady-state output level by output name
    pub outputs: BTreeMap<String, f64>,

    /// Steady-state promoter activity per sensor/gate slot
    #[serde(default)]
    pub activities: BTreeMap<Slot, f64>,

    /// Trajectory from a cold start, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_course: Option<TimeCourse>,
}

/// Result of simulating one DesignVersion. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Unique identifier
    pub id: SimulationId,

    /// Version that was simulated
    pub version: VersionId,

    /// One entry per requested input combination
    pub rows: Vec<RowLevels>,

    /// When produced
    pub created_at: Time,
}

impl SimulationResult {
    /// Wrap rows for a version.
    pub fn new(version: VersionId, rows: Vec<RowLevels>) -> Self {
        Self {
            id: SimulationId::new(),
            version,
            rows,
            created_at: chrono::Utc::now(),
        }
    }

    /// Row for an input combination.
    pub fn row(&self, inputs: &[bool]) -> Option<&RowLevels> {
        self.rows.iter().find(|r| r.inputs == inputs)
    }

    /// Whether every row carries a time course.
    pub fn has_time_course(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.time_course.is_some())
    }
}
