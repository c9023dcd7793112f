//! Butler Orchestrator
//!
//! HTTP surface of the pipeline execution engine: definition browsing, run
//! submission and status polling. Submissions return as soon as the run is
//! queued; execution happens in separate runner processes.

pub mod api;
pub mod state;

pub use state::AppState;
