//! Performance evaluation of simulated circuits.

#![warn(missing_docs)]

pub mod evaluator;

pub use evaluator::{EvaluationConfig, Evaluator};
