//! Run DTOs exchanged with the orchestrator API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::file::FileRecord;
use crate::domain::run::{Owner, Parameter, Run, RunState};

/// Request to create and dispatch a new run
///
/// Values of file-typed parameters are comma separated catalog file ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRun {
    pub owner: Owner,
    #[serde(alias = "pipeline_uid", alias = "plot_uid")]
    pub definition_uid: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// Polling view of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: i64,
    pub state: RunState,
}

/// A created run together with the handle of its queued task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub run: Run,
    pub task_id: Uuid,
}

/// A catalog file attached to a run, with the field it is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFile {
    pub field_name: String,
    #[serde(flatten)]
    pub file: FileRecord,
}
