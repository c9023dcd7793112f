//! Scheduler layer for the worker
//!
//! Claims queued tasks, runs their commands on the remote channel and hands
//! the outcome to completion handling.

pub mod poller;

pub use poller::{PollerConfig, TaskPoller};
