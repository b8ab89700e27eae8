//! Session log for GeneForge.
//!
//! Design sessions are recorded as an append-only sequence of entries:
//! versions, simulations, diagnoses, actions and state transitions. The
//! JSON-lines backend writes one file per session; the in-memory backend
//! serves tests.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;
pub mod memory;
pub mod history;

pub use trait_::{check_sequence, LogEntry, LogError, LogRecord, Result, SessionLog};
pub use json_storage::JsonlSessionLog;
pub use memory::MemorySessionLog;
pub use history::SessionHistory;
