//! Data Transfer Objects
//!
//! Shapes exchanged between the orchestrator HTTP surface and its clients,
//! plus the on-disk definition file format.

pub mod definition;
pub mod run;
pub mod task;
