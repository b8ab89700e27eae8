//! Session state machine and outcome taxonomy.

use serde::{Deserialize, Serialize};

/// Iteration controller state.
///
/// ```text
/// Designing → Simulating → Evaluating → Refining → Simulating ...
///                                     ↘ Converged | Exhausted | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Obtaining the initial assignment
    Designing,
    /// Simulating the current version
    Simulating,
    /// Evaluating the latest simulation
    Evaluating,
    /// Choosing and applying one refinement action
    Refining,
    /// Spec met (terminal)
    Converged,
    /// Budget or options ran out (terminal, best effort)
    Exhausted,
    /// Unrecoverable error (terminal)
    Failed,
}

impl ControllerState {
    /// Terminal states are never left.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ControllerState::Converged | ControllerState::Exhausted | ControllerState::Failed
        )
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: ControllerState) -> bool {
        use ControllerState::*;
        matches!(
            (self, next),
            (Designing, Simulating)
                | (Designing, Failed)
                | (Simulating, Evaluating)
                | (Simulating, Failed)
                | (Evaluating, Converged)
                | (Evaluating, Refining)
                | (Evaluating, Failed)
                | (Refining, Simulating)
                | (Refining, Exhausted)
                | (Refining, Failed)
        )
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ControllerState::Designing => "DESIGNING",
            ControllerState::Simulating => "SIMULATING",
            ControllerState::Evaluating => "EVALUATING",
            ControllerState::Refining => "REFINING",
            ControllerState::Converged => "CONVERGED",
            ControllerState::Exhausted => "EXHAUSTED",
            ControllerState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Why a session ended without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// `max_iterations` reached
    IterationBudget,
    /// No alternative part left for the slot that needed changing
    NoRefinementOptions,
    /// A stop request was honored at an iteration boundary
    StopRequested,
    /// The best score stopped improving for the configured number of versions
    Stagnated,
}

impl std::fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExhaustionReason::IterationBudget => write!(f, "iteration budget exhausted"),
            ExhaustionReason::NoRefinementOptions => write!(f, "no refinement options left"),
            ExhaustionReason::StopRequested => write!(f, "stop requested"),
            ExhaustionReason::Stagnated => write!(f, "no significant improvement"),
        }
    }
}

/// Fatal failures recorded against a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "failure", content = "detail", rename_all = "snake_case")]
pub enum DesignFailure {
    /// No part assignment realizes the logic with the available parts
    #[error("synthesis unsatisfiable: {0}")]
    SynthesisUnsatisfiable(String),

    /// The model did not reach steady state
    #[error("simulation did not converge: {0}")]
    SimulationNonconvergent(String),

    /// The model is structurally invalid
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// An external call exceeded its time bound
    #[error("adapter '{adapter}' timed out after {seconds:.1}s")]
    AdapterTimeout {
        /// Adapter name
        adapter: String,
        /// Configured bound
        seconds: f64,
    },

    /// The simulation carried too little signal to classify
    #[error("evaluation inconclusive: {0}")]
    Inconclusive(String),

    /// Any other adapter error
    #[error("adapter error: {0}")]
    Adapter(String),
}

/// Terminal status of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Every check passed
    Converged,
    /// Best-effort result; the design did not converge
    Exhausted {
        /// Why the loop stopped
        reason: ExhaustionReason,
    },
    /// Unrecoverable failure
    Failed {
        /// What went wrong
        failure: DesignFailure,
    },
}

impl SessionStatus {
    /// Controller state matching this status.
    pub fn state(&self) -> ControllerState {
        match self {
            SessionStatus::Converged => ControllerState::Converged,
            SessionStatus::Exhausted { .. } => ControllerState::Exhausted,
            SessionStatus::Failed { .. } => ControllerState::Failed,
        }
    }

    /// Whether the design met its spec.
    pub fn converged(&self) -> bool {
        matches!(self, SessionStatus::Converged)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Converged => write!(f, "converged"),
            SessionStatus::Exhausted { reason } => write!(f, "exhausted ({}); did not converge", reason),
            SessionStatus::Failed { failure } => write!(f, "failed: {}", failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ControllerState::*;

    #[test]
    fn test_terminal_states_have_no_exits() {
        let all = [Designing, Simulating, Evaluating, Refining, Converged, Exhausted, Failed];
        for from in [Converged, Exhausted, Failed] {
            assert!(from.is_terminal());
            for to in all {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_loop_transitions() {
        assert!(Designing.can_transition_to(Simulating));
        assert!(Refining.can_transition_to(Simulating));
        assert!(Evaluating.can_transition_to(Converged));
        assert!(!Designing.can_transition_to(Evaluating));
        assert!(!Simulating.can_transition_to(Refining));
        assert!(!Evaluating.can_transition_to(Exhausted));
    }

    #[test]
    fn test_failure_serde() {
        let f = DesignFailure::AdapterTimeout { adapter: "sim".into(), seconds: 1.5 };
        let json = serde_json::to_string(&f).unwrap();
        let back: DesignFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
        assert_eq!(back.to_string(), "adapter 'sim' timed out after 1.5s");
    }

    #[test]
    fn test_stagnated_status() {
        let status = SessionStatus::Exhausted { reason: ExhaustionReason::Stagnated };
        assert_eq!(status.state(), Exhausted);
        assert_eq!(status.to_string(), "exhausted (no significant improvement); did not converge");
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(serde_json::from_str::<SessionStatus>(&json).unwrap(), status);
    }
}
