//! Error types for the execution engine

use butler_core::domain::definition::DefinitionKind;
use thiserror::Error;
use uuid::Uuid;

use crate::executor::TransportError;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while submitting, executing or completing a run
#[derive(Debug, Error)]
pub enum EngineError {
    /// No definition file exists for the requested uid
    #[error("Definition not found: {kind} '{uid}'")]
    DefinitionNotFound { kind: DefinitionKind, uid: String },

    /// Definition file is not valid JSON or misses a required key
    #[error("Failed to parse definition {path}: {source}")]
    DefinitionParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Definition file parsed but its content is unusable
    #[error("Invalid definition '{uid}': {reason}")]
    InvalidDefinition { uid: String, reason: String },

    /// Identifier that would escape its folder when used as a path segment
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Command template references a name nothing provides
    #[error("Unresolved placeholder '${0}' in command template")]
    UnresolvedPlaceholder(String),

    /// Command template contains a dangling `$`
    #[error("Invalid command template: {0}")]
    InvalidTemplate(String),

    /// A file id given for a file parameter does not exist in the catalog
    #[error("Input file {file_id} for parameter '{field}' not found")]
    InputFileNotFound { field: String, file_id: i64 },

    /// A parameter value cannot be used as given
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// A required input was not supplied
    #[error("Missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("Run {0} not found")]
    RunNotFound(i64),

    #[error("Task {0} not found")]
    TaskNotFound(Uuid),

    /// The remote execution channel could not be used at all
    #[error("Remote channel error: {0}")]
    Transport(#[from] TransportError),

    /// Content sniffing failed for a discovered output
    #[error("Format detection failed for {path}: {reason}")]
    Sniff { path: String, reason: String },

    /// Walking a run folder failed
    #[error("Failed to walk output directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Filesystem operation on a known path failed
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub(crate) fn filesystem(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Whether the error means a requested entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::DefinitionNotFound { .. } | Self::RunNotFound(_) | Self::TaskNotFound(_)
        )
    }

    /// Whether the error was caused by the submitted request rather than the
    /// engine, and is reported synchronously before anything is dispatched
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Self::DefinitionParse { .. }
                | Self::InvalidDefinition { .. }
                | Self::InvalidIdentifier(_)
                | Self::UnresolvedPlaceholder(_)
                | Self::InvalidTemplate(_)
                | Self::InputFileNotFound { .. }
                | Self::InvalidParameter { .. }
                | Self::MissingParameter(_)
        )
    }
}
