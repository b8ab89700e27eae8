//! Controller errors.
//!
//! Design failures are outcomes, not errors; these cover what prevents a
//! session from being run or recorded at all.

use geneforge_core::{ControllerState, SpecError};
use geneforge_storage::LogError;

/// Errors raised by the controller.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// The spec is malformed
    #[error("invalid spec: {0}")]
    Spec(#[from] SpecError),

    /// The session log could not be written
    #[error("session log: {0}")]
    Log(#[from] LogError),

    /// Bad configuration
    #[error("config: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The state machine was asked for an illegal move
    #[error("illegal transition {from} -> {to}")]
    InvalidTransition {
        /// Current state
        from: ControllerState,
        /// Requested state
        to: ControllerState,
    },

    /// A pooled session task panicked or was cancelled
    #[error("session task failed: {0}")]
    Join(String),
}
