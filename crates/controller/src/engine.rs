//! The iteration controller - runs the design loop.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use geneforge_adapters::{
    AdapterError, CircuitSimulator, CircuitSynthesizer, ExternalSimulator, ExternalSynthesizer,
    HillSimulator, NetlistSynthesizer, PromoterTuner, RbsTuner, SequenceTuner, SimulationRequest,
    SynthesisRequest, TuneRequest,
};
use geneforge_catalog::CatalogSet;
use geneforge_core::{
    ActionKind, CircuitSpec, ControllerState, DesignFailure, DesignScore, DesignVersion, Diagnosis,
    ExhaustionReason, Lever, PartId, Provenance, RefinementAction, SessionId,
    SessionStatus, Slot, Verdict,
};
use geneforge_evaluation::Evaluator;
use geneforge_planner::{PlanningContext, PreviousStep, PriorityPlanner, RefinementPlanner};
use geneforge_storage::{LogRecord, SessionLog};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The external collaborators of a session.
#[derive(Clone)]
pub struct AdapterSet {
    /// Circuit synthesizer
    pub synthesizer: Arc<dyn CircuitSynthesizer>,
    /// Circuit simulator
    pub simulator: Arc<dyn CircuitSimulator>,
    /// Promoter tuner
    pub promoter: Arc<dyn SequenceTuner>,
    /// RBS tuner
    pub rbs: Arc<dyn SequenceTuner>,
}

impl AdapterSet {
    /// Built-in adapters over one or more part libraries.
    pub fn builtin(catalogs: impl Into<CatalogSet>, config: &ControllerConfig) -> Self {
        Self {
            synthesizer: Arc::new(NetlistSynthesizer::new(catalogs)),
            simulator: Arc::new(HillSimulator::new(config.simulation)),
            promoter: Arc::new(PromoterTuner::new(config.tuning)),
            rbs: Arc::new(RbsTuner::new(config.tuning)),
        }
    }

    /// Built-in adapters, with the synthesizer and simulator replaced by
    /// the external commands the config names.
    pub fn from_config(catalogs: impl Into<CatalogSet>, config: &ControllerConfig) -> Self {
        let mut adapters = Self::builtin(catalogs, config);
        if let Some(command) = &config.synthesizer_command {
            info!("Using external synthesizer {}", command.program);
            adapters = adapters.with_synthesizer(Arc::new(ExternalSynthesizer::new(command.clone())));
        }
        if let Some(command) = &config.simulator_command {
            info!("Using external simulator {}", command.program);
            adapters = adapters.with_simulator(Arc::new(ExternalSimulator::new(command.clone())));
        }
        adapters
    }

    /// Replace the synthesizer.
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn CircuitSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Replace the simulator.
    pub fn with_simulator(mut self, simulator: Arc<dyn CircuitSimulator>) -> Self {
        self.simulator = simulator;
        self
    }

    /// Replace the promoter tuner.
    pub fn with_promoter(mut self, tuner: Arc<dyn SequenceTuner>) -> Self {
        self.promoter = tuner;
        self
    }

    /// Replace the RBS tuner.
    pub fn with_rbs(mut self, tuner: Arc<dyn SequenceTuner>) -> Self {
        self.rbs = tuner;
        self
    }

    fn tuner(&self, lever: Lever) -> &Arc<dyn SequenceTuner> {
        match lever {
            Lever::Promoter => &self.promoter,
            Lever::Rbs => &self.rbs,
        }
    }
}

/// Requests a stop at the next iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Ask running sessions to stop.
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one design session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Session id
    pub session: SessionId,
    /// Terminal status
    pub status: SessionStatus,
    /// Refinement iterations applied
    pub iterations: u32,
    /// Best-scoring version (earliest on ties)
    pub best: Option<DesignVersion>,
    /// Diagnosis of the best version
    pub best_diagnosis: Option<Diagnosis>,
    /// Every version created, oldest first
    pub versions: Vec<DesignVersion>,
}

impl SessionOutcome {
    /// Whether the design met its spec.
    pub fn converged(&self) -> bool {
        self.status.converged()
    }

    /// Final state of the controller.
    pub fn state(&self) -> ControllerState {
        self.status.state()
    }
}

/// Mutable state of one running session. Never shared between sessions.
struct Session {
    id: SessionId,
    state: ControllerState,
    iteration: u32,
    versions: Vec<DesignVersion>,
    best: Option<(usize, DesignScore, Diagnosis)>,
    exclusions: BTreeMap<Slot, BTreeSet<PartId>>,
    /// Score of the parent of the current version
    parent_score: Option<DesignScore>,
    /// Versions since the best score last improved significantly
    stale: u32,
}

impl Session {
    fn current(&self) -> Option<&DesignVersion> {
        self.versions.last()
    }
}

/// What applying an action produced.
enum Applied {
    Version(DesignVersion),
    Stop(SessionStatus),
}

/// Drives a spec from synthesis to a terminal state.
///
/// ```text
/// Designing → Simulating → Evaluating → Refining → Simulating ...
///                                     ↘ Converged | Exhausted | Failed
/// ```
pub struct IterationController {
    adapters: AdapterSet,
    planner: Arc<dyn RefinementPlanner>,
    evaluator: Evaluator,
    log: Arc<dyn SessionLog>,
    config: ControllerConfig,
    stop: StopHandle,
}

impl IterationController {
    /// Create a controller with the default planner and configuration.
    pub fn new(adapters: AdapterSet, log: Arc<dyn SessionLog>) -> Self {
        let config = ControllerConfig::default();
        let planner = PriorityPlanner::new(adapters.promoter.clone(), adapters.rbs.clone());
        Self {
            adapters,
            planner: Arc::new(planner),
            evaluator: Evaluator::new(config.evaluation),
            log,
            config,
            stop: StopHandle::default(),
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.evaluator = Evaluator::new(config.evaluation);
        self.config = config;
        self
    }

    /// Set the planner.
    pub fn with_planner(mut self, planner: Arc<dyn RefinementPlanner>) -> Self {
        self.planner = planner;
        self
    }

    /// Handle for stopping sessions run by this controller.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Configuration in use.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// The session log.
    pub fn log(&self) -> &Arc<dyn SessionLog> {
        &self.log
    }

    /// Run a new session to a terminal state.
    pub async fn run(&self, spec: CircuitSpec) -> Result<SessionOutcome, ControllerError> {
        self.run_session(SessionId::new(), spec).await
    }

    /// Run a session under a given id.
    pub async fn run_session(&self, id: SessionId, spec: CircuitSpec) -> Result<SessionOutcome, ControllerError> {
        spec.validate()?;

        let mut session = Session {
            id,
            state: ControllerState::Designing,
            iteration: 0,
            versions: Vec::new(),
            best: None,
            exclusions: BTreeMap::new(),
            parent_score: None,
            stale: 0,
        };
        info!("Session {} started for {} (max {} iterations)", id, spec.name, self.config.max_iterations);
        self.record(&session, LogRecord::SessionStarted {
            spec: spec.clone(),
            max_iterations: self.config.max_iterations,
        })
        .await?;

        // Designing
        let request = SynthesisRequest::new(spec.clone());
        let synthesizer = self.adapters.synthesizer.clone();
        let assignment = match self.call(synthesizer.name(), synthesizer.synthesize(&request)).await {
            Ok(assignment) => assignment,
            Err(e) => return self.fail(&mut session, e.into_failure()).await,
        };
        let initial = DesignVersion::initial(assignment);
        self.add_version(&mut session, initial).await?;
        self.transition(&mut session, ControllerState::Simulating).await?;

        let mut previous: Option<RefinementAction> = None;
        loop {
            let Some(version) = session.current().cloned() else {
                return Err(ControllerError::Config("session has no current version".into()));
            };

            // Simulating
            let request = SimulationRequest {
                version: version.id,
                assignment: version.assignment.clone(),
                inputs: spec.inputs.clone(),
                rows: spec.combinations(),
                time_course: spec.needs_time_course(),
            };
            let simulator = self.adapters.simulator.clone();
            let result = match self.call(simulator.name(), simulator.simulate(&request)).await {
                Ok(result) => result,
                Err(e) => return self.fail(&mut session, e.into_failure()).await,
            };
            self.record(&session, LogRecord::SimulationRecorded { result: result.clone() }).await?;
            self.transition(&mut session, ControllerState::Evaluating).await?;

            // Evaluating
            let diagnosis = self.evaluator.diagnose(&spec, &version.assignment, &result);
            self.record(&session, LogRecord::DiagnosisRecorded { diagnosis: diagnosis.clone() }).await?;
            let score = diagnosis.score();
            info!(
                "Session {} v{}: {:?}, {} logic failures, total violation {:.3}",
                session.id, version.revision, diagnosis.verdict, score.logic_failures, score.total_violation
            );
            self.track_best(&mut session, &diagnosis);

            match diagnosis.verdict {
                Verdict::Pass => {
                    return self.finish(&mut session, SessionStatus::Converged).await;
                }
                Verdict::Inconclusive => {
                    let failure = DesignFailure::Inconclusive(diagnosis.notes.join("; "));
                    return self.fail(&mut session, failure).await;
                }
                Verdict::Fail => {}
            }
            self.transition(&mut session, ControllerState::Refining).await?;

            // Refining
            if self.stop.is_stop_requested() {
                info!("Session {} stopping on request", session.id);
                return self.exhaust(&mut session, ExhaustionReason::StopRequested).await;
            }
            if let Some(limit) = self.config.stagnation_limit {
                if session.stale >= limit {
                    info!("Session {} stagnated for {} versions", session.id, session.stale);
                    return self.exhaust(&mut session, ExhaustionReason::Stagnated).await;
                }
            }

            let previous_step = previous.take().map(|action| PreviousStep {
                improved: session.parent_score.map_or(true, |parent| score.is_better_than(&parent)),
                action,
            });
            let ctx = PlanningContext::new(&diagnosis, &version.assignment).with_previous(previous_step.as_ref());
            let action = self.planner.plan(&ctx);
            self.record(&session, LogRecord::ActionPlanned { version: version.id, action: action.clone() }).await?;
            info!("Session {} v{}: {} ({})", session.id, version.revision, action, action.rationale);

            if action.is_accept() {
                warn!("Planner accepted a failing design: {}", action.rationale);
                return self.exhaust(&mut session, ExhaustionReason::NoRefinementOptions).await;
            }
            if session.iteration >= self.config.max_iterations {
                return self.exhaust(&mut session, ExhaustionReason::IterationBudget).await;
            }

            let next = match self.apply(&mut session, &spec, &version, &action).await? {
                Applied::Version(next) => next,
                Applied::Stop(SessionStatus::Failed { failure }) => {
                    return self.fail(&mut session, failure).await;
                }
                Applied::Stop(status) => return self.finish(&mut session, status).await,
            };

            session.iteration += 1;
            session.parent_score = Some(score);
            self.add_version(&mut session, next).await?;
            previous = Some(action);
            self.transition(&mut session, ControllerState::Simulating).await?;
        }
    }

    /// Apply one action to `version`, producing the next version.
    async fn apply(
        &self,
        session: &mut Session,
        spec: &CircuitSpec,
        version: &DesignVersion,
        action: &RefinementAction,
    ) -> Result<Applied, ControllerError> {
        match &action.kind {
            ActionKind::Tune { slot, parameter, direction, factor } => {
                let Some(part) = version.assignment.part(slot) else {
                    let failure = DesignFailure::InvalidModel(format!("{} has no part to tune", slot));
                    return Ok(Applied::Stop(SessionStatus::Failed { failure }));
                };
                let tuner = self.adapters.tuner(parameter.lever()).clone();
                let request = TuneRequest {
                    parameter: *parameter,
                    direction: *direction,
                    factor: *factor,
                };
                match self.call(tuner.name(), tuner.tune(part, &request)).await {
                    Ok(tuned) => {
                        let assignment = version.assignment.with_part(slot.clone(), tuned);
                        Ok(Applied::Version(version.derive(assignment, Provenance::Refinement {
                            action: action.clone(),
                            escalated: false,
                        })))
                    }
                    Err(AdapterError::OutOfBounds(reason)) => {
                        info!("Escalating to reassignment of {}: {}", slot, reason);
                        let escalated = RefinementAction {
                            kind: ActionKind::Reassign {
                                slot: slot.clone(),
                                exclude: part.id().clone(),
                            },
                            rationale: format!("{}; {}", action.rationale, reason),
                        };
                        self.reassign(session, spec, version, escalated, true).await
                    }
                    Err(e) => Ok(Applied::Stop(SessionStatus::Failed { failure: e.into_failure() })),
                }
            }
            ActionKind::Reassign { .. } => self.reassign(session, spec, version, action.clone(), false).await,
            // Accept never reaches here
            ActionKind::Accept => Ok(Applied::Stop(SessionStatus::Exhausted {
                reason: ExhaustionReason::NoRefinementOptions,
            })),
        }
    }

    async fn reassign(
        &self,
        session: &mut Session,
        spec: &CircuitSpec,
        version: &DesignVersion,
        action: RefinementAction,
        escalated: bool,
    ) -> Result<Applied, ControllerError> {
        if let ActionKind::Reassign { slot, exclude } = &action.kind {
            session
                .exclusions
                .entry(slot.clone())
                .or_default()
                .insert(exclude.clone());
        }

        let request = SynthesisRequest::new(spec.clone())
            .with_base(version.assignment.clone())
            .with_exclusions(session.exclusions.clone());
        let synthesizer = self.adapters.synthesizer.clone();
        match self.call(synthesizer.name(), synthesizer.synthesize(&request)).await {
            Ok(assignment) => Ok(Applied::Version(
                version.derive(assignment, Provenance::Refinement { action, escalated }),
            )),
            Err(AdapterError::Unsatisfiable(reason)) => {
                info!("No alternative part: {}", reason);
                Ok(Applied::Stop(SessionStatus::Exhausted {
                    reason: ExhaustionReason::NoRefinementOptions,
                }))
            }
            Err(e) => Ok(Applied::Stop(SessionStatus::Failed { failure: e.into_failure() })),
        }
    }

    /// Await an adapter call under the configured bound.
    async fn call<T, F>(&self, adapter: &str, call: F) -> Result<T, AdapterError>
    where
        F: Future<Output = Result<T, AdapterError>>,
    {
        let limit = self.config.adapter_timeout();
        debug!("Calling {}", adapter);
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{} timed out after {:?}", adapter, limit);
                Err(AdapterError::Timeout {
                    adapter: adapter.to_string(),
                    seconds: limit.as_secs_f64(),
                })
            }
        }
    }

    fn track_best(&self, session: &mut Session, diagnosis: &Diagnosis) {
        let score = diagnosis.score();
        let index = session.versions.len() - 1;
        let (better, significant) = match &session.best {
            None => (true, true),
            Some((_, best, _)) => {
                let better = score.is_better_than(best);
                let gain = best.total_violation - score.total_violation;
                let significant = score.logic_failures < best.logic_failures
                    || (better && gain >= self.config.min_improvement * best.total_violation);
                (better, significant)
            }
        };
        if better {
            session.best = Some((index, score, diagnosis.clone()));
        }
        if significant {
            session.stale = 0;
        } else {
            session.stale += 1;
        }
    }

    async fn add_version(&self, session: &mut Session, version: DesignVersion) -> Result<(), ControllerError> {
        self.record(session, LogRecord::VersionCreated { version: version.clone() }).await?;
        session.versions.push(version);
        Ok(())
    }

    async fn transition(&self, session: &mut Session, to: ControllerState) -> Result<(), ControllerError> {
        let from = session.state;
        if !from.can_transition_to(to) {
            return Err(ControllerError::InvalidTransition { from, to });
        }
        debug!("Session {}: {} -> {}", session.id, from, to);
        self.record(session, LogRecord::StateChanged { from, to, iteration: session.iteration }).await?;
        session.state = to;
        Ok(())
    }

    async fn record(&self, session: &Session, record: LogRecord) -> Result<(), ControllerError> {
        self.log.append(session.id, record).await?;
        Ok(())
    }

    async fn fail(&self, session: &mut Session, failure: DesignFailure) -> Result<SessionOutcome, ControllerError> {
        warn!("Session {} failed: {}", session.id, failure);
        self.record(session, LogRecord::FailureRecorded {
            version: session.current().map(|v| v.id),
            failure: failure.clone(),
        })
        .await?;
        self.finish(session, SessionStatus::Failed { failure }).await
    }

    async fn exhaust(&self, session: &mut Session, reason: ExhaustionReason) -> Result<SessionOutcome, ControllerError> {
        self.finish(session, SessionStatus::Exhausted { reason }).await
    }

    async fn finish(&self, session: &mut Session, status: SessionStatus) -> Result<SessionOutcome, ControllerError> {
        self.transition(session, status.state()).await?;

        let (best, best_diagnosis) = match &session.best {
            Some((index, _, diagnosis)) => (session.versions.get(*index).cloned(), Some(diagnosis.clone())),
            None => (None, None),
        };
        self.record(session, LogRecord::SessionFinished {
            status: status.clone(),
            iterations: session.iteration,
            best: best.as_ref().map(|v| v.id),
        })
        .await?;
        info!("Session {} {} after {} iterations", session.id, status, session.iteration);

        Ok(SessionOutcome {
            session: session.id,
            status,
            iterations: session.iteration,
            best,
            best_diagnosis,
            versions: std::mem::take(&mut session.versions),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use geneforge_adapters::{CommandSpec, SimulationSettings, TuningBounds};
    use geneforge_catalog::reference_catalog;
    use geneforge_core::{
        AssignedPart, Constraint, Direction, GateId, RowLevels, SimulationResult, TunedParameter,
    };
    use geneforge_planner::ReplayPlanner;
    use geneforge_storage::{JsonlSessionLog, MemorySessionLog, SessionHistory};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Returns scripted (ON, OFF) output levels for successive simulations,
    /// repeating the last entry.
    struct ScriptedSimulator {
        script: Vec<(f64, f64)>,
        expected_on: fn(&[bool]) -> bool,
        calls: Mutex<usize>,
        delay: Option<Duration>,
    }

    impl ScriptedSimulator {
        fn new(script: Vec<(f64, f64)>, expected_on: fn(&[bool]) -> bool) -> Self {
            Self {
                script,
                expected_on,
                calls: Mutex::new(0),
                delay: None,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CircuitSimulator for ScriptedSimulator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult, AdapterError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls - 1
            };
            let (on, off) = self.script[call.min(self.script.len() - 1)];

            let rows = request
                .rows
                .iter()
                .map(|inputs| {
                    let level = if (self.expected_on)(inputs) { on } else { off };
                    let mut outputs = BTreeMap::new();
                    let mut activities = BTreeMap::new();
                    for wiring in &request.assignment.netlist.outputs {
                        outputs.insert(wiring.output.clone(), level);
                        for slot in request.assignment.driver_slots(&wiring.output) {
                            activities.insert(slot, level);
                        }
                    }
                    RowLevels {
                        inputs: inputs.clone(),
                        outputs,
                        activities,
                        time_course: None,
                    }
                })
                .collect();
            Ok(SimulationResult::new(request.version, rows))
        }
    }

    /// Simulator whose model never settles.
    struct NonconvergentSimulator {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl CircuitSimulator for NonconvergentSimulator {
        fn name(&self) -> &str {
            "stiff"
        }

        async fn simulate(&self, _request: &SimulationRequest) -> Result<SimulationResult, AdapterError> {
            *self.calls.lock().unwrap() += 1;
            Err(AdapterError::Nonconvergent("GFP oscillates".into()))
        }
    }

    /// Promoter tuner that takes longer than any test bound.
    struct SlowTuner;

    #[async_trait]
    impl SequenceTuner for SlowTuner {
        fn name(&self) -> &str {
            "slow-promoter"
        }

        fn lever(&self) -> Lever {
            Lever::Promoter
        }

        fn achievable_range(&self, _part: &AssignedPart, _parameter: TunedParameter, _direction: Direction) -> f64 {
            10.0
        }

        async fn tune(&self, part: &AssignedPart, _request: &TuneRequest) -> Result<AssignedPart, AdapterError> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(part.clone())
        }
    }

    fn inverted(inputs: &[bool]) -> bool {
        !inputs[0]
    }

    fn leaky_not() -> CircuitSpec {
        CircuitSpec::from_expressions("not", ["A"], &[("GFP", "!A")])
            .unwrap()
            .with_constraint(Constraint::MaxLeak { output: None, ratio: 0.1 })
    }

    fn controller(
        config: ControllerConfig,
        simulator: Arc<dyn CircuitSimulator>,
        log: Arc<dyn SessionLog>,
    ) -> IterationController {
        let adapters = AdapterSet::builtin(reference_catalog(), &config).with_simulator(simulator);
        IterationController::new(adapters, log).with_config(config)
    }

    fn scripted(script: Vec<(f64, f64)>) -> (Arc<ScriptedSimulator>, IterationController) {
        scripted_with(ControllerConfig::default(), script)
    }

    fn scripted_with(config: ControllerConfig, script: Vec<(f64, f64)>) -> (Arc<ScriptedSimulator>, IterationController) {
        let simulator = Arc::new(ScriptedSimulator::new(script, inverted));
        let controller = controller(config, simulator.clone(), Arc::new(MemorySessionLog::new()));
        (simulator, controller)
    }

    #[tokio::test]
    async fn test_buffer_converges_without_refinement() {
        let spec = CircuitSpec::from_expressions("buffer", ["A"], &[("GFP", "A")]).unwrap();
        let simulator = Arc::new(ScriptedSimulator::new(vec![(20.0, 0.5)], |r| r[0]));
        let controller = controller(ControllerConfig::default(), simulator.clone(), Arc::new(MemorySessionLog::new()));

        let outcome = controller.run(spec).await.unwrap();
        assert!(outcome.converged());
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.versions.len(), 1);
        assert_eq!(outcome.best.as_ref().map(|v| v.revision), Some(0));
        assert!(outcome.best_diagnosis.unwrap().is_passing());
        assert_eq!(simulator.calls(), 1);
    }

    #[tokio::test]
    async fn test_leaky_not_converges_after_basal_tune() {
        let (simulator, controller) = scripted(vec![(20.0, 5.0), (15.0, 1.0)]);
        let outcome = controller.run(leaky_not()).await.unwrap();

        assert_eq!(outcome.status, SessionStatus::Converged);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.versions.len(), 2);
        assert_eq!(simulator.calls(), 2);

        let refined = &outcome.versions[1];
        assert_eq!(refined.parent, Some(outcome.versions[0].id));
        match refined.action().map(|a| &a.kind) {
            Some(ActionKind::Tune { slot, parameter, direction, factor }) => {
                assert_eq!(*slot, Slot::Gate(GateId::nth(1)));
                assert_eq!(*parameter, TunedParameter::Basal);
                assert_eq!(*direction, Direction::Decrease);
                assert!((factor - 0.4).abs() < 1e-9);
            }
            other => panic!("expected a tune, got {:?}", other),
        }
        assert_eq!(outcome.best.map(|v| v.id), Some(refined.id));

        let entries = controller.log().entries(outcome.session).await.unwrap();
        assert_eq!(entries.first().map(|e| e.record.label()), Some("session_started"));
        assert_eq!(entries.last().map(|e| e.record.label()), Some("session_finished"));
    }

    #[tokio::test]
    async fn test_unsatisfiable_spec_fails_before_simulation() {
        let spec = CircuitSpec::from_expressions("off", ["A"], &[("GFP", "0")]).unwrap();
        let (simulator, controller) = scripted(vec![(20.0, 1.0)]);

        let outcome = controller.run(spec).await.unwrap();
        assert!(matches!(
            outcome.status,
            SessionStatus::Failed { failure: DesignFailure::SynthesisUnsatisfiable(_) }
        ));
        assert_eq!(simulator.calls(), 0);
        assert!(outcome.versions.is_empty());
        assert!(outcome.best.is_none());
    }

    #[tokio::test]
    async fn test_iteration_budget_returns_best_version() {
        let config = ControllerConfig::default().with_max_iterations(3);
        let (simulator, controller) = scripted_with(config, vec![(20.0, 5.0), (20.0, 3.0), (20.0, 4.0), (20.0, 6.0)]);

        let outcome = controller.run(leaky_not()).await.unwrap();
        assert_eq!(
            outcome.status,
            SessionStatus::Exhausted { reason: ExhaustionReason::IterationBudget }
        );
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.versions.len(), 4);
        assert_eq!(simulator.calls(), 4);
        assert_eq!(outcome.best.map(|v| v.revision), Some(1));
        assert!(!outcome.best_diagnosis.unwrap().is_passing());
    }

    #[tokio::test]
    async fn test_zero_budget_evaluates_initial_design_only() {
        let config = ControllerConfig::default().with_max_iterations(0);
        let (simulator, controller) = scripted_with(config, vec![(20.0, 5.0)]);

        let outcome = controller.run(leaky_not()).await.unwrap();
        assert_eq!(outcome.state(), ControllerState::Exhausted);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(simulator.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_simulator_times_out() {
        let config = ControllerConfig::default().with_adapter_timeout(Duration::from_millis(50));
        let simulator = Arc::new(ScriptedSimulator::new(vec![(20.0, 1.0)], inverted).with_delay(Duration::from_secs(2)));
        let controller = controller(config, simulator, Arc::new(MemorySessionLog::new()));

        let outcome = controller.run(leaky_not()).await.unwrap();
        match outcome.status {
            SessionStatus::Failed { failure: DesignFailure::AdapterTimeout { adapter, .. } } => {
                assert_eq!(adapter, "scripted");
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert_eq!(outcome.versions.len(), 1);
    }

    #[tokio::test]
    async fn test_silent_circuit_is_inconclusive() {
        let (_, controller) = scripted(vec![(0.0, 0.0)]);
        let outcome = controller.run(leaky_not()).await.unwrap();
        assert!(matches!(
            outcome.status,
            SessionStatus::Failed { failure: DesignFailure::Inconclusive(_) }
        ));
    }

    #[tokio::test]
    async fn test_stop_request_ends_at_iteration_boundary() {
        let (simulator, controller) = scripted(vec![(20.0, 5.0)]);
        controller.stop_handle().request_stop();

        let outcome = controller.run(leaky_not()).await.unwrap();
        assert_eq!(
            outcome.status,
            SessionStatus::Exhausted { reason: ExhaustionReason::StopRequested }
        );
        assert_eq!(outcome.iterations, 0);
        assert_eq!(simulator.calls(), 1);
        assert!(outcome.best.is_some());
    }

    #[tokio::test]
    async fn test_tune_at_bound_escalates_to_reassignment() {
        let config = ControllerConfig::default().with_tuning(TuningBounds { min_scale: 1.0, max_scale: 10.0 });
        let (_, controller) = scripted_with(config, vec![(20.0, 5.0), (20.0, 1.0)]);

        let outcome = controller.run(leaky_not()).await.unwrap();
        assert!(outcome.converged());

        let gate = Slot::Gate(GateId::nth(1));
        let before = outcome.versions[0].assignment.part(&gate).unwrap().id().clone();
        let after = outcome.versions[1].assignment.part(&gate).unwrap().id().clone();
        assert_ne!(before, after);
        match &outcome.versions[1].provenance {
            Provenance::Refinement { action, escalated } => {
                assert!(*escalated);
                assert_eq!(
                    action.kind,
                    ActionKind::Reassign { slot: gate.clone(), exclude: before }
                );
            }
            other => panic!("expected a refinement, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recorded_session_replays() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(JsonlSessionLog::new(dir.path()).await.unwrap());
        let script = vec![(20.0, 5.0), (15.0, 1.0)];

        let simulator = Arc::new(ScriptedSimulator::new(script.clone(), inverted));
        let outcome = controller(ControllerConfig::default(), simulator, log.clone())
            .run(leaky_not())
            .await
            .unwrap();

        let history = SessionHistory::load(log.as_ref(), outcome.session).await.unwrap();
        assert!(history.is_finished());
        assert_eq!(history.status, Some(SessionStatus::Converged));
        assert_eq!(history.iterations, Some(1));
        assert_eq!(history.versions.len(), 2);
        assert_eq!(history.actions.len(), 1);
        assert_eq!(history.best, outcome.best.as_ref().map(|v| v.id));

        let replay = Arc::new(ReplayPlanner::from_history(&history));
        let simulator = Arc::new(ScriptedSimulator::new(script, inverted));
        let replayed = controller(ControllerConfig::default(), simulator, log.clone())
            .with_planner(replay.clone())
            .run(leaky_not())
            .await
            .unwrap();

        assert!(replayed.converged());
        assert_eq!(replay.remaining(), 0);
        assert_eq!(
            replayed.versions[1].action().map(|a| &a.kind),
            outcome.versions[1].action().map(|a| &a.kind)
        );
        assert_eq!(log.sessions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_builtin_adapters_terminate_within_budget() {
        let specs = vec![
            leaky_not(),
            CircuitSpec::from_expressions("and", ["A", "B"], &[("GFP", "A & B")])
                .unwrap()
                .with_constraint(Constraint::MaxLeak { output: None, ratio: 0.05 }),
            CircuitSpec::from_expressions("nor", ["A", "B"], &[("YFP", "!(A | B)")])
                .unwrap()
                .with_constraint(Constraint::MinOnLevel { output: None, level: 50.0 }),
        ];
        let config = ControllerConfig::default().with_max_iterations(4);
        let adapters = AdapterSet::builtin(reference_catalog(), &config);
        let controller = IterationController::new(adapters, Arc::new(MemorySessionLog::new())).with_config(config);

        for spec in specs {
            let outcome = controller.run(spec).await.unwrap();
            assert!(outcome.state().is_terminal());
            assert!(outcome.iterations <= 4);
            assert_eq!(outcome.versions.len() as u32, outcome.iterations + 1);
        }
    }

    #[tokio::test]
    async fn test_slow_builtin_simulation_times_out() {
        let spec = CircuitSpec::from_expressions("not", ["A"], &[("GFP", "!A")])
            .unwrap()
            .with_constraint(Constraint::MaxResponseTime { output: None, hours: 100.0 });
        let settings = SimulationSettings {
            horizon_hours: 300.0,
            time_step_hours: 1e-4,
            ..SimulationSettings::default()
        };
        let config = ControllerConfig::default()
            .with_simulation(settings)
            .with_adapter_timeout(Duration::from_millis(50));
        let adapters = AdapterSet::builtin(reference_catalog(), &config);
        let controller = IterationController::new(adapters, Arc::new(MemorySessionLog::new())).with_config(config);

        let started = std::time::Instant::now();
        let outcome = controller.run(spec).await.unwrap();
        match outcome.status {
            SessionStatus::Failed { failure: DesignFailure::AdapterTimeout { adapter, .. } } => {
                assert_eq!(adapter, "hill");
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_nonconvergent_simulation_fails() {
        let simulator = Arc::new(NonconvergentSimulator { calls: Mutex::new(0) });
        let controller = controller(ControllerConfig::default(), simulator.clone(), Arc::new(MemorySessionLog::new()));

        let outcome = controller.run(leaky_not()).await.unwrap();
        assert!(matches!(
            outcome.status,
            SessionStatus::Failed { failure: DesignFailure::SimulationNonconvergent(_) }
        ));
        assert_eq!(*simulator.calls.lock().unwrap(), 1);
        assert_eq!(outcome.versions.len(), 1);
        assert_eq!(outcome.iterations, 0);
    }

    #[tokio::test]
    async fn test_slow_tuner_times_out_while_refining() {
        let config = ControllerConfig::default().with_adapter_timeout(Duration::from_millis(50));
        let simulator = Arc::new(ScriptedSimulator::new(vec![(20.0, 5.0)], inverted));
        let adapters = AdapterSet::builtin(reference_catalog(), &config)
            .with_simulator(simulator)
            .with_promoter(Arc::new(SlowTuner));
        let controller = IterationController::new(adapters, Arc::new(MemorySessionLog::new())).with_config(config);

        let outcome = controller.run(leaky_not()).await.unwrap();
        match outcome.status {
            SessionStatus::Failed { failure: DesignFailure::AdapterTimeout { adapter, .. } } => {
                assert_eq!(adapter, "slow-promoter");
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
        assert_eq!(outcome.versions.len(), 1);
        assert_eq!(outcome.iterations, 0);
    }

    #[tokio::test]
    async fn test_stagnation_limit_stops_flat_session() {
        let config = ControllerConfig::default().with_stagnation(2, 0.0);
        let (simulator, controller) = scripted_with(config, vec![(20.0, 5.0)]);

        let outcome = controller.run(leaky_not()).await.unwrap();
        assert_eq!(
            outcome.status,
            SessionStatus::Exhausted { reason: ExhaustionReason::Stagnated }
        );
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.versions.len(), 3);
        assert_eq!(simulator.calls(), 3);
        assert_eq!(outcome.best.map(|v| v.revision), Some(0));
    }

    #[tokio::test]
    async fn test_small_gains_count_as_stagnation() {
        // Each version trims the leak a little; 10% of the best violation is required
        let config = ControllerConfig::default().with_stagnation(2, 0.1);
        let script = vec![(20.0, 5.0), (20.0, 4.95), (20.0, 4.9), (20.0, 4.85)];
        let (_, controller) = scripted_with(config, script);

        let outcome = controller.run(leaky_not()).await.unwrap();
        assert_eq!(
            outcome.status,
            SessionStatus::Exhausted { reason: ExhaustionReason::Stagnated }
        );
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.best.map(|v| v.revision), Some(2));
    }

    #[tokio::test]
    async fn test_external_commands_replace_builtin_adapters() {
        let unsatisfiable = CommandSpec::new(
            "sh",
            &["-c", r#"cat >/dev/null; echo '{"error":{"kind":"unsatisfiable","message":"no repressors"}}'"#],
        );
        let config = ControllerConfig::default().with_synthesizer_command(unsatisfiable);
        let adapters = AdapterSet::from_config(reference_catalog(), &config);
        let controller = IterationController::new(adapters, Arc::new(MemorySessionLog::new())).with_config(config);
        let outcome = controller.run(leaky_not()).await.unwrap();
        assert_eq!(
            outcome.status,
            SessionStatus::Failed { failure: DesignFailure::SynthesisUnsatisfiable("no repressors".into()) }
        );

        let stiff = CommandSpec::new(
            "sh",
            &["-c", r#"cat >/dev/null; echo '{"error":{"kind":"nonconvergent","message":"stiff system"}}'"#],
        );
        let config = ControllerConfig::default().with_simulator_command(stiff);
        let adapters = AdapterSet::from_config(reference_catalog(), &config);
        assert_eq!(adapters.simulator.name(), "sh");
        assert_eq!(adapters.synthesizer.name(), "netlist");
        let controller = IterationController::new(adapters, Arc::new(MemorySessionLog::new())).with_config(config);
        let outcome = controller.run(leaky_not()).await.unwrap();
        assert!(matches!(
            outcome.status,
            SessionStatus::Failed { failure: DesignFailure::SimulationNonconvergent(_) }
        ));
        assert_eq!(outcome.versions.len(), 1);
    }
}
