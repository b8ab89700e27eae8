//! Refinement planning.
//!
//! A planner turns a diagnosis into exactly one corrective action.

#![warn(missing_docs)]

pub mod context;
pub mod priority;
pub mod replay;

pub use context::{PlanningContext, PreviousStep, RefinementPlanner};
pub use priority::PriorityPlanner;
pub use replay::ReplayPlanner;
