//! Task DTOs exchanged with the orchestrator API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::task::TaskState;

/// Polling view of a queued task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: Uuid,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
