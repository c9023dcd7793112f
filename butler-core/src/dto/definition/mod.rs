//! Definition file format
//!
//! The JSON document a pipeline or plot author drops into the definition
//! catalog. Only the fields listed here are ever copied into the catalog;
//! unknown keys in the file are ignored.

use serde::{Deserialize, Serialize};

use crate::domain::definition::{InputSpec, OutputSpec};

/// Field name given to the output declared through `output_file_name`
pub const LEGACY_OUTPUT_FIELD: &str = "output_file";

/// Parsed definition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionFile {
    pub uid: String,
    pub filename: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub executor: String,
    pub command: String,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    /// Single-output shorthand used by plot definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file_name: Option<String>,
}

impl DefinitionFile {
    /// Declared outputs, with the single-output shorthand expanded
    pub fn effective_outputs(&self) -> Vec<OutputSpec> {
        if !self.outputs.is_empty() {
            return self.outputs.clone();
        }

        match &self.output_file_name {
            Some(value) => vec![OutputSpec {
                name: LEGACY_OUTPUT_FIELD.to_string(),
                label: String::new(),
                output_type: "file".to_string(),
                value: value.clone(),
                format: String::new(),
            }],
            None => Vec::new(),
        }
    }
}
