//! Core domain types
//!
//! These types represent the catalog entities the engine reads and writes.
//! They are shared between the orchestrator (submission, status polling) and
//! the runner (execution, ingestion).

pub mod definition;
pub mod file;
pub mod run;
pub mod task;
