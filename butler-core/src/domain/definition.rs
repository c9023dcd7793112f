//! Definition domain types

use serde::{Deserialize, Serialize};

/// Which catalog a definition belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Pipeline,
    Plot,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Pipeline => "pipeline",
            DefinitionKind::Plot => "plot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pipeline" => Some(DefinitionKind::Pipeline),
            "plot" => Some(DefinitionKind::Plot),
            _ => None,
        }
    }
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog record of a pipeline or plot definition
///
/// The record is always in sync with the checksum of the file it was loaded
/// from. When the file changes, every field and both the input and output lists are replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub id: i64,
    pub kind: DefinitionKind,
    pub uid: String,
    pub filename: String,
    pub name: String,
    pub description: String,
    pub executor: String,
    pub command: String,
    pub checksum: String,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputSpec>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Definition {
    /// Looks up a declared input by field name
    pub fn input(&self, name: &str) -> Option<&InputSpec> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Looks up a declared output by field name
    pub fn output(&self, name: &str) -> Option<&OutputSpec> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// Declared input field of a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub help: String,
    #[serde(rename = "type")]
    pub input_type: String,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub required: bool,
}

impl InputSpec {
    /// File inputs carry comma separated catalog file ids instead of a value
    pub fn is_file(&self) -> bool {
        self.input_type == "file"
    }
}

/// Declared output field of a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub output_type: String,
    /// Default output name the program writes to, also the template value
    pub value: String,
    #[serde(default)]
    pub format: String,
}
