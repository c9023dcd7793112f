//! Butler Core
//!
//! Core types shared by the Butler pipeline execution services.
//!
//! This crate contains:
//! - Domain types: definitions, runs, catalog files and queued tasks
//! - DTOs: request/response shapes exchanged with the orchestrator API

pub mod domain;
pub mod dto;
