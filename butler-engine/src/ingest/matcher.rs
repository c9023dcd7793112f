//! Output matching
//!
//! Pairs the files a run produced with the output fields its definition
//! declared. Criteria are tried in this order, each over all bindings in
//! declaration order, and the first hit wins:
//! 1. the file name (or path inside the run folder) equals the binding value
//! 2. the file name without extension equals the binding value
//! 3. one of its parent folders inside the run folder is named like the value

use std::path::{Path, PathBuf};

use butler_core::domain::task::OutputBinding;
use walkdir::WalkDir;

use crate::error::Result;

/// A produced file paired with the field it was matched to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    pub field: String,
    /// Path inside the run folder
    pub relative: PathBuf,
    /// Path as reached from this process
    pub path: PathBuf,
}

/// Walks a run folder and returns every file matching a binding
pub fn discover(run_dir: &Path, bindings: &[OutputBinding]) -> Result<Vec<MatchedFile>> {
    let mut matched = Vec::new();

    for entry in WalkDir::new(run_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(run_dir) else {
            continue;
        };

        match match_binding(relative, bindings) {
            Some(binding) => {
                tracing::debug!("{} matched output '{}'", relative.display(), binding.field);
                matched.push(MatchedFile {
                    field: binding.field.clone(),
                    relative: relative.to_path_buf(),
                    path: entry.path().to_path_buf(),
                });
            }
            None => tracing::debug!("{} matches no declared output", relative.display()),
        }
    }

    Ok(matched)
}

/// First binding a file inside the run folder matches, if any
pub fn match_binding<'a>(relative: &Path, bindings: &'a [OutputBinding]) -> Option<&'a OutputBinding> {
    let name = relative.file_name()?.to_str()?;
    let stem = relative.file_stem().and_then(|s| s.to_str());
    let folders: Vec<&str> = relative
        .parent()
        .map(|p| p.iter().filter_map(|c| c.to_str()).collect())
        .unwrap_or_default();

    let values: Vec<(&OutputBinding, &str)> = bindings
        .iter()
        .map(|b| (b, b.value.trim_matches('/')))
        .filter(|(_, value)| !value.is_empty())
        .collect();

    let find = |hit: &dyn Fn(&str) -> bool| {
        values
            .iter()
            .find(|(_, value)| hit(value))
            .map(|(binding, _)| *binding)
    };

    find(&|value: &str| name == value || relative == Path::new(value))
        .or_else(|| find(&|value: &str| stem == Some(value)))
        .or_else(|| find(&|value: &str| folders.iter().any(|folder| *folder == value)))
}
