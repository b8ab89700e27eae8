//! GeneForge core data models.
//!
//! This crate defines the data structures shared by the design loop:
//! circuit specs, characterized parts, part assignments, design versions,
//! simulation results, diagnoses and refinement actions.

#![warn(missing_docs)]

// Core identities
mod id;
mod error;

// Specification
mod expr;
mod spec;

// Parts and topology
mod part;
mod netlist;
mod assignment;

// Design loop records
mod design;
mod simulation;
mod diagnosis;
mod action;
mod session;

// Re-exports
pub use id::*;
pub use error::{NetlistError, SpecError};

pub use expr::LogicExpr;
pub use spec::{
    all_combinations, CircuitSpec, Constraint, ConstraintKind, TruthRow,
    DEFAULT_LIBRARY, DEFAULT_ORGANISM, MAX_INPUTS,
};

pub use part::{Expression, HillResponse, Part, PartKind, PartRole};
pub use netlist::{Gate, GateKind, Netlist, OutputWiring, Signal};
pub use assignment::{AssignedPart, PartAssignment, Slot, Tuning};

pub use design::{DesignVersion, Provenance};
pub use simulation::{RowLevels, SimulationResult, TimeCourse};
pub use diagnosis::{
    ConstraintCheck, DesignScore, Diagnosis, RowCheck, Verdict, MAX_RELATIVE_VIOLATION,
};
pub use action::{ActionKind, Direction, Lever, RefinementAction, TunedParameter};
pub use session::{ControllerState, DesignFailure, ExhaustionReason, SessionStatus};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
