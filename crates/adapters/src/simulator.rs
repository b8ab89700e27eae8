//! Built-in Hill-function simulator.
//!
//! Sensors respond instantly to their inducer. Each gate carries a repressor
//! level `x` with `dx/dt = rate * (translation * Σ inputs - x)` and drives its
//! output promoter through its Hill response. Each reporter level follows the
//! same first-order kinetics on the sum of its driving promoters.
//!
//! Integration runs on the blocking pool so a call bounded by a timeout is
//! abandoned on time; the abandoned integration stops at its next check of
//! the cancel flag.

use super::r#trait::{AdapterError, CircuitSimulator, SimulationRequest};
use async_trait::async_trait;
use geneforge_core::{
    GateId, PartAssignment, PartKind, RowLevels, Signal, SimulationResult, Slot, TimeCourse,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Euler steps between checks of the cancel flag.
const CANCEL_CHECK_STEPS: usize = 1024;

/// Integration settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Simulated time in hours
    pub horizon_hours: f64,
    /// Euler step in hours
    pub time_step_hours: f64,
    /// Record one sample every this many steps
    pub sample_every: usize,
    /// Relative distance from steady state accepted at the horizon
    pub tolerance: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            horizon_hours: 24.0,
            time_step_hours: 0.01,
            sample_every: 10,
            tolerance: 1e-3,
        }
    }
}

impl SimulationSettings {
    fn check(&self) -> Result<usize, AdapterError> {
        if !(self.horizon_hours > 0.0 && self.time_step_hours > 0.0 && self.sample_every > 0) {
            return Err(AdapterError::InvalidModel(format!(
                "invalid integration settings: {:?}",
                self
            )));
        }
        Ok((self.horizon_hours / self.time_step_hours).round() as usize)
    }
}

/// Compiled per-part parameters of one assignment.
struct Model<'a> {
    order: Vec<&'a geneforge_core::Gate>,
    assignment: &'a PartAssignment,
}

impl<'a> Model<'a> {
    fn compile(assignment: &'a PartAssignment) -> Result<Self, AdapterError> {
        assignment
            .validate()
            .map_err(|e| AdapterError::InvalidModel(e.to_string()))?;
        let order = assignment
            .netlist
            .topological_order()
            .map_err(|e| AdapterError::InvalidModel(e.to_string()))?;
        Ok(Self { order, assignment })
    }

    fn gate_part(&self, id: &GateId) -> Result<&'a geneforge_core::AssignedPart, AdapterError> {
        self.assignment
            .part(&Slot::Gate(id.clone()))
            .ok_or_else(|| AdapterError::InvalidModel(format!("gate {} has no part", id)))
    }

    fn sensor_activity(&self, name: &str, on: bool) -> Result<f64, AdapterError> {
        let slot = Slot::Sensor(name.to_string());
        match self.assignment.part(&slot).map(|p| &p.part.kind) {
            Some(PartKind::Sensor { off, on: high, .. }) => Ok(if on { *high } else { *off }),
            _ => Err(AdapterError::InvalidModel(format!("{} has no sensor part", slot))),
        }
    }

    /// Promoter activity of every sensor and gate, given repressor levels.
    fn activities(
        &self,
        sensors: &HashMap<String, f64>,
        repressors: &HashMap<GateId, f64>,
    ) -> Result<HashMap<Signal, f64>, AdapterError> {
        let mut act: HashMap<Signal, f64> = HashMap::new();
        act.insert(Signal::Constitutive, 1.0);
        for (name, level) in sensors {
            act.insert(Signal::Input(name.clone()), *level);
        }
        for gate in &self.order {
            let response = match &self.gate_part(&gate.id)?.part.kind {
                PartKind::Gate { response, .. } => *response,
                _ => return Err(AdapterError::InvalidModel(format!("gate {} is not a repressor", gate.id))),
            };
            let x = repressors.get(&gate.id).copied().unwrap_or(0.0);
            act.insert(Signal::Gate(gate.id.clone()), response.output(x));
        }
        Ok(act)
    }

    /// Translation-weighted sum of input activities.
    fn drive(&self, inputs: &[Signal], translation: f64, act: &HashMap<Signal, f64>) -> f64 {
        translation * inputs.iter().map(|s| act.get(s).copied().unwrap_or(0.0)).sum::<f64>()
    }

    fn reporter(&self, output: &str) -> Result<&'a geneforge_core::AssignedPart, AdapterError> {
        let slot = Slot::Reporter(output.to_string());
        self.assignment
            .part(&slot)
            .ok_or_else(|| AdapterError::InvalidModel(format!("{} has no part", slot)))
    }

    /// Exact steady state: repressor levels settle gate by gate in topological order.
    fn steady_state(
        &self,
        sensors: &HashMap<String, f64>,
    ) -> Result<(HashMap<Signal, f64>, BTreeMap<String, f64>), AdapterError> {
        let mut repressors: HashMap<GateId, f64> = HashMap::new();
        let mut act = self.activities(sensors, &repressors)?;
        for gate in &self.order {
            let part = self.gate_part(&gate.id)?;
            let x = self.drive(&gate.inputs, part.part.expression.translation, &act);
            repressors.insert(gate.id.clone(), x);
            act = self.activities(sensors, &repressors)?;
        }

        let mut outputs = BTreeMap::new();
        for wiring in &self.assignment.netlist.outputs {
            let reporter = self.reporter(&wiring.output)?;
            let level = self.drive(&wiring.drivers, reporter.part.expression.translation, &act);
            outputs.insert(wiring.output.clone(), level);
        }
        Ok((act, outputs))
    }

    /// Euler integration from a cold start.
    fn time_course(
        &self,
        sensors: &HashMap<String, f64>,
        settings: &SimulationSettings,
        steps: usize,
        cancel: &AtomicBool,
    ) -> Result<(TimeCourse, BTreeMap<String, f64>), AdapterError> {
        let dt = settings.time_step_hours;
        let mut repressors: HashMap<GateId, f64> =
            self.order.iter().map(|g| (g.id.clone(), 0.0)).collect();
        let mut reporters: BTreeMap<String, f64> = self
            .assignment
            .netlist
            .outputs
            .iter()
            .map(|w| (w.output.clone(), 0.0))
            .collect();

        let mut times = Vec::new();
        let mut series: BTreeMap<String, Vec<f64>> =
            reporters.keys().map(|k| (k.clone(), Vec::new())).collect();

        for step in 0..=steps {
            if step % settings.sample_every == 0 || step == steps {
                times.push(step as f64 * dt);
                for (name, level) in &reporters {
                    if let Some(s) = series.get_mut(name) {
                        s.push(*level);
                    }
                }
            }
            if step == steps {
                break;
            }
            if step % CANCEL_CHECK_STEPS == 0 && cancel.load(Ordering::Relaxed) {
                return Err(AdapterError::Task(format!("integration cancelled at {:.2}h", step as f64 * dt)));
            }

            let act = self.activities(sensors, &repressors)?;
            for gate in &self.order {
                let part = self.gate_part(&gate.id)?;
                let target = self.drive(&gate.inputs, part.part.expression.translation, &act);
                if let Some(x) = repressors.get_mut(&gate.id) {
                    *x += dt * part.part.expression.rate * (target - *x);
                }
            }
            for wiring in &self.assignment.netlist.outputs {
                let reporter = self.reporter(&wiring.output)?;
                let target = self.drive(&wiring.drivers, reporter.part.expression.translation, &act);
                if let Some(p) = reporters.get_mut(&wiring.output) {
                    *p += dt * reporter.part.expression.rate * (target - *p);
                }
            }
        }

        Ok((TimeCourse { times, outputs: series }, reporters))
    }
}

/// ODE simulator over Hill transfer functions.
pub struct HillSimulator {
    settings: SimulationSettings,
}

impl HillSimulator {
    /// Create a simulator.
    pub fn new(settings: SimulationSettings) -> Self {
        Self { settings }
    }

    /// Integration settings.
    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Simulate synchronously.
    pub fn run(&self, request: &SimulationRequest) -> Result<SimulationResult, AdapterError> {
        self.run_until(request, &AtomicBool::new(false))
    }

    /// Simulate synchronously, giving up once `cancel` is set.
    pub fn run_until(&self, request: &SimulationRequest, cancel: &AtomicBool) -> Result<SimulationResult, AdapterError> {
        let model = Model::compile(&request.assignment)?;
        let steps = if request.time_course { self.settings.check()? } else { 0 };

        let mut rows = Vec::with_capacity(request.rows.len());
        for values in &request.rows {
            if values.len() != request.inputs.len() {
                return Err(AdapterError::InvalidModel(format!(
                    "row has {} values for {} inputs",
                    values.len(),
                    request.inputs.len()
                )));
            }

            let mut sensors = HashMap::new();
            for name in request.assignment.netlist.referenced_inputs() {
                let i = request
                    .inputs
                    .iter()
                    .position(|n| *n == name)
                    .ok_or_else(|| AdapterError::InvalidModel(format!("netlist reads unknown input {}", name)))?;
                sensors.insert(name.clone(), model.sensor_activity(&name, values[i])?);
            }

            let (act, outputs) = model.steady_state(&sensors)?;
            if let Some((name, level)) = outputs.iter().find(|(_, l)| !l.is_finite()) {
                return Err(AdapterError::Nonconvergent(format!("{} steady state is {}", name, level)));
            }

            let time_course = if request.time_course {
                let (course, last) = model.time_course(&sensors, &self.settings, steps, cancel)?;
                for (name, steady) in &outputs {
                    let reached = last.get(name).copied().unwrap_or(f64::NAN);
                    let allowed = self.settings.tolerance * steady.abs().max(1e-9);
                    if !reached.is_finite() || (reached - steady).abs() > allowed {
                        return Err(AdapterError::Nonconvergent(format!(
                            "{} at {}h is {:.6}, steady state {:.6}",
                            name, self.settings.horizon_hours, reached, steady
                        )));
                    }
                }
                Some(course)
            } else {
                None
            };

            let activities = act
                .into_iter()
                .filter_map(|(signal, level)| Slot::for_signal(&signal).map(|slot| (slot, level)))
                .collect();

            rows.push(RowLevels {
                inputs: values.clone(),
                outputs,
                activities,
                time_course,
            });
        }

        Ok(SimulationResult::new(request.version, rows))
    }
}

struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

impl Default for HillSimulator {
    fn default() -> Self {
        Self::new(SimulationSettings::default())
    }
}

#[async_trait]
impl CircuitSimulator for HillSimulator {
    fn name(&self) -> &str {
        "hill"
    }

    async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult, AdapterError> {
        let cancel = Arc::new(AtomicBool::new(false));
        // Set when this future completes or is dropped by a timeout
        let _guard = CancelOnDrop(cancel.clone());

        let simulator = HillSimulator::new(self.settings);
        let owned = request.clone();
        let result = tokio::task::spawn_blocking(move || simulator.run_until(&owned, &cancel))
            .await
            .map_err(|e| AdapterError::Task(e.to_string()))??;
        tracing::debug!(
            "Simulated version {} over {} rows",
            request.version,
            result.rows.len()
        );
        Ok(result)
    }
}
