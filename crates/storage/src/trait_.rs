//! Session log abstraction.

use async_trait::async_trait;
use geneforge_core::{
    CircuitSpec, ControllerState, DesignFailure, DesignVersion, Diagnosis, RefinementAction,
    SessionId, SessionStatus, SimulationResult, Time, VersionId,
};
use serde::{Deserialize, Serialize};

/// Error type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session has no log
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entries are out of order or malformed
    #[error("Corrupt log for session {session}: {reason}")]
    Corrupt {
        /// Session id
        session: SessionId,
        /// What is wrong
        reason: String,
    },
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogRecord {
    /// A session began
    SessionStarted {
        /// Target behavior
        spec: CircuitSpec,
        /// Iteration budget in force
        max_iterations: u32,
    },

    /// Controller moved between states
    StateChanged {
        /// Previous state
        from: ControllerState,
        /// New state
        to: ControllerState,
        /// Iteration counter at the transition
        iteration: u32,
    },

    /// A design version was created
    VersionCreated {
        /// The version
        version: DesignVersion,
    },

    /// A version was simulated
    SimulationRecorded {
        /// The result
        result: SimulationResult,
    },

    /// A simulation was evaluated
    DiagnosisRecorded {
        /// The diagnosis
        diagnosis: Diagnosis,
    },

    /// The planner chose an action for a version
    ActionPlanned {
        /// Version the action responds to
        version: VersionId,
        /// The action
        action: RefinementAction,
    },

    /// A fatal failure
    FailureRecorded {
        /// Version the failure is attributed to
        version: Option<VersionId>,
        /// The failure
        failure: DesignFailure,
    },

    /// The session reached a terminal state
    SessionFinished {
        /// Terminal status
        status: SessionStatus,
        /// Refinement iterations run
        iterations: u32,
        /// Best-scoring version
        best: Option<VersionId>,
    },
}

impl LogRecord {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            LogRecord::SessionStarted { .. } => "session_started",
            LogRecord::StateChanged { .. } => "state_changed",
            LogRecord::VersionCreated { .. } => "version_created",
            LogRecord::SimulationRecorded { .. } => "simulation_recorded",
            LogRecord::DiagnosisRecorded { .. } => "diagnosis_recorded",
            LogRecord::ActionPlanned { .. } => "action_planned",
            LogRecord::FailureRecorded { .. } => "failure_recorded",
            LogRecord::SessionFinished { .. } => "session_finished",
        }
    }
}

/// One appended record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Session the entry belongs to
    pub session: SessionId,
    /// Position in the session log, starting at 0
    pub seq: u64,
    /// When appended
    pub timestamp: Time,
    /// Payload
    pub record: LogRecord,
}

/// Append-only log of design sessions.
///
/// There is no update or delete: entries, once appended, are permanent.
/// Appends to one session are serialized by the implementation.
#[async_trait]
pub trait SessionLog: Send + Sync {
    /// Append a record, returning the stored entry.
    async fn append(&self, session: SessionId, record: LogRecord) -> Result<LogEntry>;

    /// All entries of a session in append order.
    async fn entries(&self, session: SessionId) -> Result<Vec<LogEntry>>;

    /// Sessions with at least one entry.
    async fn sessions(&self) -> Result<Vec<SessionId>>;
}

/// Check that `entries` form a gap-free sequence for `session`.
pub fn check_sequence(session: SessionId, entries: &[LogEntry]) -> Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        if entry.session != session {
            return Err(LogError::Corrupt {
                session,
                reason: format!("entry {} belongs to session {}", i, entry.session),
            });
        }
        if entry.seq != i as u64 {
            return Err(LogError::Corrupt {
                session,
                reason: format!("expected seq {}, found {}", i, entry.seq),
            });
        }
    }
    Ok(())
}
