//! Butler Engine
//!
//! Pipeline execution engine shared by the orchestrator and the runner:
//! - Definition store: loads definitions from disk, cached by checksum
//! - Command templater: turns parameters into a remote shell command
//! - Run service: creates, dispatches, inspects and deletes runs
//! - Task queue: durable hand-off between orchestrator and workers
//! - Remote executor: runs commands over ssh or a local shell
//! - Completion: ingests artifacts on success, records logs on failure

pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod queue;
pub mod repository;
pub mod scheduler;
pub mod service;

pub use config::{ChannelConfig, EngineConfig, SshConfig, StorageLayout};
pub use error::{EngineError, Result};
