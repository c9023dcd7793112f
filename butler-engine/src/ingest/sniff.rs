//! Format detection for produced files

use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;

use crate::error::{EngineError, Result};

/// What content sniffing says about a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SniffedFormat {
    pub mime_type: String,
    /// Full human readable description (e.g. "ASCII text")
    pub description: String,
}

pub trait FormatSniffer: Send + Sync {
    fn sniff(&self, path: &Path) -> Result<SniffedFormat>;
}

/// Sniffs with the system `file` utility
#[derive(Debug, Clone)]
pub struct FileCommandSniffer {
    program: String,
    magic_file: Option<PathBuf>,
}

impl FileCommandSniffer {
    pub fn new(magic_file: Option<PathBuf>) -> Self {
        Self {
            program: "file".to_string(),
            magic_file,
        }
    }

    /// Checks that the `file` utility can be started
    pub fn check_available(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|e| EngineError::Sniff {
                path: self.program.clone(),
                reason: format!("failed to run {}: {}. Is it installed?", self.program, e),
            })?;

        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or_default().trim().to_string())
    }

    fn run(&self, path: &Path, args: &[&str]) -> Result<String> {
        let mut command = Command::new(&self.program);
        command.arg("--brief").args(args);
        if let Some(magic) = &self.magic_file {
            command.arg("--magic-file").arg(magic);
        }

        let output = command.arg(path).output().map_err(|e| EngineError::Sniff {
            path: path.display().to_string(),
            reason: format!("failed to run {}: {}", self.program, e),
        })?;

        if !output.status.success() {
            return Err(EngineError::Sniff {
                path: path.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl FormatSniffer for FileCommandSniffer {
    fn sniff(&self, path: &Path) -> Result<SniffedFormat> {
        Ok(SniffedFormat {
            mime_type: self.run(path, &["--mime-type"])?,
            description: self.run(path, &["--uncompress"])?,
        })
    }
}

/// Ordered regex → short format table
///
/// Loaded from a JSON object whose keys are regexes searched in the full
/// description and whose values are short names. Keys are tried in file
/// order; the file extension is the fallback.
#[derive(Debug, Default)]
pub struct FormatDatabase {
    entries: Vec<(Regex, String)>,
}

impl FormatDatabase {
    pub fn new(entries: Vec<(Regex, String)>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| EngineError::filesystem(path, e))?;
        Self::from_json(&raw)
            .map_err(|reason| EngineError::Config(format!("{}: {}", path.display(), reason)))
    }

    pub fn from_json(raw: &str) -> std::result::Result<Self, String> {
        let table: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| e.to_string())?;

        let mut entries = Vec::with_capacity(table.len());
        for (pattern, format) in table {
            let regex = Regex::new(&pattern).map_err(|e| e.to_string())?;
            let format = format
                .as_str()
                .ok_or_else(|| format!("format for '{pattern}' is not a string"))?;
            entries.push((regex, format.to_string()));
        }

        Ok(Self { entries })
    }

    /// Short format for a file given its full description
    pub fn short_format(&self, description: &str, file_name: &str) -> String {
        self.entries
            .iter()
            .find(|(regex, _)| regex.is_match(description))
            .map(|(_, format)| format.clone())
            .unwrap_or_else(|| {
                Path::new(file_name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_string()
            })
    }
}
