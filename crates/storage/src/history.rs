//! Session history reconstructed from log entries.

use super::{LogEntry, LogError, LogRecord, Result, SessionLog};
use geneforge_core::{
    CircuitSpec, ControllerState, DesignFailure, DesignVersion, Diagnosis, RefinementAction,
    SessionId, SessionStatus, SimulationResult, VersionId,
};

/// Everything one session produced, in log order.
#[derive(Debug, Clone)]
pub struct SessionHistory {
    /// Session id
    pub session: SessionId,
    /// Target behavior
    pub spec: Option<CircuitSpec>,
    /// Iteration budget in force
    pub max_iterations: Option<u32>,
    /// Every version, oldest first
    pub versions: Vec<DesignVersion>,
    /// Every simulation result
    pub simulations: Vec<SimulationResult>,
    /// Every diagnosis
    pub diagnoses: Vec<Diagnosis>,
    /// Planned actions with the version they respond to
    pub actions: Vec<(VersionId, RefinementAction)>,
    /// State transitions with their iteration counter
    pub transitions: Vec<(ControllerState, ControllerState, u32)>,
    /// Recorded failures
    pub failures: Vec<(Option<VersionId>, DesignFailure)>,
    /// Terminal status, once finished
    pub status: Option<SessionStatus>,
    /// Iterations run, once finished
    pub iterations: Option<u32>,
    /// Best version, once finished
    pub best: Option<VersionId>,
}

impl SessionHistory {
    /// Replay entries of one session.
    pub fn from_entries(session: SessionId, entries: &[LogEntry]) -> Self {
        let mut history = Self {
            session,
            spec: None,
            max_iterations: None,
            versions: Vec::new(),
            simulations: Vec::new(),
            diagnoses: Vec::new(),
            actions: Vec::new(),
            transitions: Vec::new(),
            failures: Vec::new(),
            status: None,
            iterations: None,
            best: None,
        };

        for entry in entries {
            match &entry.record {
                LogRecord::SessionStarted { spec, max_iterations } => {
                    history.spec = Some(spec.clone());
                    history.max_iterations = Some(*max_iterations);
                }
                LogRecord::StateChanged { from, to, iteration } => {
                    history.transitions.push((*from, *to, *iteration));
                }
                LogRecord::VersionCreated { version } => history.versions.push(version.clone()),
                LogRecord::SimulationRecorded { result } => history.simulations.push(result.clone()),
                LogRecord::DiagnosisRecorded { diagnosis } => history.diagnoses.push(diagnosis.clone()),
                LogRecord::ActionPlanned { version, action } => {
                    history.actions.push((*version, action.clone()));
                }
                LogRecord::FailureRecorded { version, failure } => {
                    history.failures.push((*version, failure.clone()));
                }
                LogRecord::SessionFinished { status, iterations, best } => {
                    history.status = Some(status.clone());
                    history.iterations = Some(*iterations);
                    history.best = *best;
                }
            }
        }
        history
    }

    /// Load a session from a log.
    pub async fn load(log: &dyn SessionLog, session: SessionId) -> Result<Self> {
        let entries = log.entries(session).await?;
        if entries.is_empty() {
            return Err(LogError::NotFound(format!("session {}", session)));
        }
        Ok(Self::from_entries(session, &entries))
    }

    /// Look up a version.
    pub fn version(&self, id: VersionId) -> Option<&DesignVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// Diagnosis of a version.
    pub fn diagnosis(&self, version: VersionId) -> Option<&Diagnosis> {
        self.diagnoses.iter().find(|d| d.version == version)
    }

    /// Action planned in response to a version.
    pub fn action_for(&self, version: VersionId) -> Option<&RefinementAction> {
        self.actions.iter().find(|(v, _)| *v == version).map(|(_, a)| a)
    }

    /// The reported best version.
    pub fn best_version(&self) -> Option<&DesignVersion> {
        self.best.and_then(|id| self.version(id))
    }

    /// Parent chain from `id` back to the initial version, newest first.
    pub fn lineage(&self, id: VersionId) -> Vec<&DesignVersion> {
        let mut chain = Vec::new();
        let mut next = self.version(id);
        while let Some(version) = next {
            chain.push(version);
            next = version.parent.and_then(|p| self.version(p));
        }
        chain
    }

    /// Whether the session reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySessionLog;
    use geneforge_core::{Netlist, PartAssignment, Provenance};

    fn empty_assignment() -> PartAssignment {
        PartAssignment { netlist: Netlist::default(), parts: Default::default() }
    }

    #[tokio::test]
    async fn test_history_reconstructs_lineage_and_status() {
        let log = MemorySessionLog::new();
        let session = SessionId::new();
        let spec = CircuitSpec::from_expressions("buf", ["A"], &[("GFP", "A")]).unwrap();

        let v0 = DesignVersion::initial(empty_assignment());
        let action = RefinementAction::accept("placeholder");
        let v1 = v0.derive(empty_assignment(), Provenance::Refinement { action: action.clone(), escalated: false });

        log.append(session, LogRecord::SessionStarted { spec: spec.clone(), max_iterations: 3 }).await.unwrap();
        log.append(session, LogRecord::VersionCreated { version: v0.clone() }).await.unwrap();
        log.append(session, LogRecord::ActionPlanned { version: v0.id, action }).await.unwrap();
        log.append(session, LogRecord::VersionCreated { version: v1.clone() }).await.unwrap();
        log.append(session, LogRecord::SessionFinished {
            status: SessionStatus::Converged,
            iterations: 1,
            best: Some(v1.id),
        }).await.unwrap();

        let history = SessionHistory::load(&log, session).await.unwrap();
        assert_eq!(history.spec, Some(spec));
        assert_eq!(history.versions.len(), 2);
        assert!(history.action_for(v0.id).is_some());
        assert_eq!(history.best_version().map(|v| v.id), Some(v1.id));
        let lineage: Vec<_> = history.lineage(v1.id).iter().map(|v| v.revision).collect();
        assert_eq!(lineage, vec![1, 0]);
        assert!(history.is_finished());
    }

    #[tokio::test]
    async fn test_unknown_session_fails_to_load() {
        let log = MemorySessionLog::new();
        assert!(SessionHistory::load(&log, SessionId::new()).await.is_err());
    }
}
