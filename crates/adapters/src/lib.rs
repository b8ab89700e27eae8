//! Adapters
//!
//! Synthesizer, simulator and sequence-tuning collaborators behind async
//! traits, with built-in implementations and external-command bridges.

#![warn(missing_docs)]

pub mod r#trait;
pub mod synthesizer;
pub mod simulator;
pub mod tuner;
pub mod external;

pub use r#trait::{
    AdapterError, CircuitSimulator, CircuitSynthesizer, SequenceTuner, SimulationRequest,
    SynthesisRequest, TuneRequest,
};
pub use synthesizer::{build_netlist, NetlistSynthesizer};
pub use simulator::{HillSimulator, SimulationSettings};
pub use tuner::{PromoterTuner, RbsTuner, TuningBounds};
pub use external::{
    run_json_command, CommandSpec, ExternalError, ExternalErrorKind, ExternalReply,
    ExternalSimulator, ExternalSynthesizer,
};
