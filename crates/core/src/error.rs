//! Errors for building and validating core models.

/// Errors raised while constructing or validating a CircuitSpec.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpecError {
    /// Logic expression could not be parsed
    #[error("expression error: {0}")]
    Expression(String),

    /// Expression references a signal that is not a declared input
    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    /// Structural problem with the spec
    #[error("invalid circuit spec: {0}")]
    Invalid(String),
}

/// Errors raised by netlist analysis.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetlistError {
    /// A signal references a gate that does not exist
    #[error("unknown gate '{0}'")]
    UnknownGate(String),

    /// The gate graph contains a feedback loop
    #[error("netlist contains a cycle through gate '{0}'")]
    Cycle(String),

    /// A slot has no part or the wrong kind of part
    #[error("slot {slot}: {reason}")]
    Slot {
        /// Slot label
        slot: String,
        /// What is wrong
        reason: String,
    },
}
