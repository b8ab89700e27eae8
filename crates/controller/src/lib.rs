//! Iteration controller for GeneForge.
//!
//! Drives a circuit spec through the design loop until it reaches a terminal
//! state. Every step is written to the session log.

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod pool;

pub use config::ControllerConfig;
pub use engine::{AdapterSet, IterationController, SessionOutcome, StopHandle};
pub use error::ControllerError;
pub use pool::SessionPool;
