//! Queued task domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::RunKind;

/// Delivery state of a queued task
///
/// This is the queue's view, independent of the run state. A task can end in
/// `Failure` while its run stays `PENDING` (transport errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Queued,
    Started,
    Success,
    Failure,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "QUEUED",
            TaskState::Started => "STARTED",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(TaskState::Queued),
            "STARTED" => Some(TaskState::Started),
            "SUCCESS" => Some(TaskState::Success),
            "FAILURE" => Some(TaskState::Failure),
            _ => None,
        }
    }
}

/// Output field bound to the name the program writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBinding {
    pub field: String,
    pub value: String,
}

impl OutputBinding {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Everything a worker needs to execute and complete a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub id: Uuid,
    pub run_id: i64,
    pub run_kind: RunKind,
    pub definition_id: i64,
    pub command: String,
    pub output_bindings: Vec<OutputBinding>,
}

/// Queue record of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub description: TaskDescription,
    pub state: TaskState,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}
