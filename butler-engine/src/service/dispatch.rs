//! Dispatcher
//!
//! Hands a planned run to the task queue and returns the task handle without
//! waiting for anything to execute.

use std::sync::Arc;

use butler_core::domain::run::RunKind;
use butler_core::domain::task::{OutputBinding, TaskDescription};
use uuid::Uuid;

use crate::error::Result;
use crate::queue::TaskQueue;

/// What a worker needs to know about the run besides the command
#[derive(Debug, Clone)]
pub struct DispatchMetadata {
    pub run_id: i64,
    pub run_kind: RunKind,
    pub definition_id: i64,
    pub output_bindings: Vec<OutputBinding>,
}

#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    /// Enqueues the command and returns the task handle
    pub async fn submit(&self, command: String, metadata: DispatchMetadata) -> Result<Uuid> {
        let description = TaskDescription {
            id: Uuid::new_v4(),
            run_id: metadata.run_id,
            run_kind: metadata.run_kind,
            definition_id: metadata.definition_id,
            command,
            output_bindings: metadata.output_bindings,
        };

        self.queue.enqueue(&description).await?;

        tracing::info!(
            "Run {} dispatched as task {}",
            description.run_id,
            description.id
        );

        Ok(description.id)
    }
}
