//! Run domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::definition::DefinitionKind;

/// Kind of execution request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Analysis,
    Visualization,
}

impl RunKind {
    /// Definition catalog a run of this kind is built from
    pub fn definition_kind(&self) -> DefinitionKind {
        match self {
            RunKind::Analysis => DefinitionKind::Pipeline,
            RunKind::Visualization => DefinitionKind::Plot,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Analysis => "analysis",
            RunKind::Visualization => "visualization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analysis" => Some(RunKind::Analysis),
            "visualization" => Some(RunKind::Visualization),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a run
///
/// `Pending` is the only non-terminal state. Once a run reaches `Success` or
/// `Failure` it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Pending,
    Success,
    Failure,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "PENDING",
            RunState::Success => "SUCCESS",
            RunState::Failure => "FAILURE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RunState::Pending),
            "SUCCESS" => Some(RunState::Success),
            "FAILURE" => Some(RunState::Failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity owning a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    User,
    Experiment,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::User => "user",
            OwnerKind::Experiment => "experiment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(OwnerKind::User),
            "experiment" => Some(OwnerKind::Experiment),
            _ => None,
        }
    }
}

/// Explicit identity of the entity a run belongs to
///
/// `storage_key` is the owner's folder name under the data root (a username
/// or an experiment hash), supplied by the surrounding service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub kind: OwnerKind,
    pub id: i64,
    pub storage_key: String,
}

impl Owner {
    pub fn user(id: i64, username: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::User,
            id,
            storage_key: username.into(),
        }
    }

    pub fn experiment(id: i64, sha: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Experiment,
            id,
            storage_key: sha.into(),
        }
    }
}

/// One execution request against a definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub kind: RunKind,
    pub owner: Owner,
    pub definition_id: i64,
    pub definition_uid: String,
    pub state: RunState,
    pub task_id: Option<Uuid>,
    pub parameters: Vec<Parameter>,
    pub input_files: Vec<FileAssociation>,
    pub output_files: Vec<FileAssociation>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Name/value pair; scalar parameters only once stored on a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Link between a run and a catalog file under a definition field name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAssociation {
    pub run_id: i64,
    pub file_id: i64,
    pub field_name: String,
}
