//! Command Templater
//!
//! Turns a definition's command template and the parameters of a submission
//! into the shell command sent to the compute host.
//!
//! Placeholders are `$name` or `${name}`; `$$` is a literal dollar. Values are
//! looked up in one context built from, in increasing priority: scalar
//! parameters, resolved input file paths, then output bindings.

use std::collections::HashMap;
use std::sync::LazyLock;

use butler_core::domain::definition::Definition;
use butler_core::domain::file::FileRecord;
use butler_core::domain::run::Parameter;
use butler_core::domain::task::OutputBinding;
use regex::Regex;

use crate::config::StorageLayout;
use crate::error::{EngineError, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:(\$)|([_a-zA-Z][_a-zA-Z0-9]*)|\{([_a-zA-Z][_a-zA-Z0-9]*)\}|())")
        .expect("placeholder pattern is valid")
});

/// Source of catalog file records by ID
pub trait FileResolver {
    fn file(&self, id: i64) -> Option<&FileRecord>;
}

impl FileResolver for HashMap<i64, FileRecord> {
    fn file(&self, id: i64) -> Option<&FileRecord> {
        self.get(&id)
    }
}

/// An input file bound to a definition field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBinding {
    pub field: String,
    pub file_id: i64,
}

/// Parameters of a submission checked against the definition schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParameters {
    pub scalars: Vec<Parameter>,
    pub inputs: Vec<InputBinding>,
    /// Space separated compute host paths, per file field
    file_paths: Vec<(String, String)>,
}

/// Everything needed to persist and dispatch a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    pub command: String,
    pub output_bindings: Vec<OutputBinding>,
    pub scalar_parameters: Vec<Parameter>,
    pub input_bindings: Vec<InputBinding>,
}

/// Resolves parameters and renders the command for a run folder in one step
pub fn build(
    definition: &Definition,
    parameters: &[Parameter],
    files: &dyn FileResolver,
    layout: &StorageLayout,
    remote_run_dir: &str,
) -> Result<CommandPlan> {
    let resolved = resolve(definition, parameters, files, layout)?;
    render(definition, &resolved, layout, remote_run_dir)
}

/// Catalog file IDs referenced by the file-typed parameters
///
/// Values that fail to parse are skipped here and reported by [`resolve`].
pub fn referenced_file_ids(definition: &Definition, parameters: &[Parameter]) -> Vec<i64> {
    parameters
        .iter()
        .filter(|p| definition.input(&p.name).is_some_and(|i| i.is_file()))
        .flat_map(|p| p.value.split(','))
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

/// Splits parameters into scalars and input files and resolves every file
pub fn resolve(
    definition: &Definition,
    parameters: &[Parameter],
    files: &dyn FileResolver,
    layout: &StorageLayout,
) -> Result<ResolvedParameters> {
    // Last value given for a name wins
    let mut last = HashMap::new();
    for (index, parameter) in parameters.iter().enumerate() {
        last.insert(parameter.name.as_str(), index);
    }

    let mut resolved = ResolvedParameters {
        scalars: Vec::new(),
        inputs: Vec::new(),
        file_paths: Vec::new(),
    };

    for (index, parameter) in parameters.iter().enumerate() {
        if last.get(parameter.name.as_str()) != Some(&index) {
            continue;
        }

        let spec = match definition.input(&parameter.name) {
            Some(spec) if spec.is_file() => spec,
            _ => {
                resolved.scalars.push(parameter.clone());
                continue;
            }
        };

        let ids = parse_ids(&parameter.name, &parameter.value)?;
        if ids.len() > 1 && !spec.multiple {
            return Err(EngineError::InvalidParameter {
                name: parameter.name.clone(),
                reason: format!("accepts a single file, got {}", ids.len()),
            });
        }

        let mut paths = Vec::with_capacity(ids.len());
        for file_id in ids {
            let record = files.file(file_id).ok_or_else(|| EngineError::InputFileNotFound {
                field: parameter.name.clone(),
                file_id,
            })?;
            paths.push(layout.remote_file_path(&record.path));
            resolved.inputs.push(InputBinding {
                field: parameter.name.clone(),
                file_id,
            });
        }

        resolved
            .file_paths
            .push((parameter.name.clone(), paths.join(" ")));
    }

    for spec in &definition.inputs {
        if last.contains_key(spec.name.as_str()) {
            continue;
        }
        if spec.required {
            return Err(EngineError::MissingParameter(spec.name.clone()));
        }
        // Omitted optional file inputs substitute as empty
        if spec.is_file() {
            resolved.file_paths.push((spec.name.clone(), String::new()));
        }
    }

    Ok(resolved)
}

/// Renders the final command for a run folder on the compute host
pub fn render(
    definition: &Definition,
    resolved: &ResolvedParameters,
    layout: &StorageLayout,
    remote_run_dir: &str,
) -> Result<CommandPlan> {
    let output_bindings: Vec<OutputBinding> = definition
        .outputs
        .iter()
        .map(|o| OutputBinding::new(o.name.trim_matches('/'), o.value.clone()))
        .collect();

    let mut context: HashMap<&str, &str> = HashMap::new();
    for parameter in &resolved.scalars {
        context.insert(&parameter.name, &parameter.value);
    }
    for (field, paths) in &resolved.file_paths {
        context.insert(field, paths);
    }
    for binding in &output_bindings {
        context.insert(&binding.field, &binding.value);
    }

    let arguments = substitute(&definition.command, &context)?;
    let command = format!(
        "cd {}; {} {} {}",
        remote_run_dir,
        definition.executor,
        layout.script_path(definition),
        arguments
    )
    .trim_end()
    .to_string();

    Ok(CommandPlan {
        command,
        output_bindings,
        scalar_parameters: resolved.scalars.clone(),
        input_bindings: resolved.inputs.clone(),
    })
}

/// Substitutes `$name`/`${name}` placeholders
pub fn substitute(template: &str, context: &HashMap<&str, &str>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        if caps.get(1).is_some() {
            out.push('$');
            continue;
        }

        let name = caps.get(2).or_else(|| caps.get(3));
        match name {
            Some(name) => {
                let value = context
                    .get(name.as_str())
                    .ok_or_else(|| EngineError::UnresolvedPlaceholder(name.as_str().to_string()))?;
                out.push_str(value);
            }
            None => {
                return Err(EngineError::InvalidTemplate(format!(
                    "invalid placeholder at position {}",
                    whole.start()
                )));
            }
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

fn parse_ids(name: &str, value: &str) -> Result<Vec<i64>> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidParameter {
            name: name.to_string(),
            reason: "no file ids given".to_string(),
        });
    }

    value
        .split(',')
        .map(|id| {
            id.trim().parse::<i64>().map_err(|_| EngineError::InvalidParameter {
                name: name.to_string(),
                reason: format!("'{}' is not a file id", id.trim()),
            })
        })
        .collect()
}
