//! Definition Store
//!
//! Loads pipeline and plot definitions from the filesystem catalog and keeps
//! the database copy in sync with the file it came from. The SHA-256 of the
//! file bytes is the sync key: while it matches the stored checksum the
//! catalog record is used as-is.

use std::collections::HashSet;
use std::path::Path;

use butler_core::domain::definition::{Definition, DefinitionKind};
use butler_core::dto::definition::DefinitionFile;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::config::StorageLayout;
use crate::error::{EngineError, Result};
use crate::repository::definition_repository;

#[derive(Clone)]
pub struct DefinitionStore {
    pool: SqlitePool,
    layout: StorageLayout,
}

impl DefinitionStore {
    pub fn new(pool: SqlitePool, layout: StorageLayout) -> Self {
        Self { pool, layout }
    }

    /// Returns the up-to-date catalog record for a definition
    ///
    /// Reparses and replaces the record when the file checksum differs from
    /// the stored one, or when no record exists yet.
    pub async fn load(&self, kind: DefinitionKind, uid: &str) -> Result<Definition> {
        let path = self.layout.definition_path(kind, uid)?;
        let bytes = read_definition(&path, kind, uid).await?;
        let checksum = sha256_hex(&bytes);

        let mut conn = self.pool.acquire().await?;
        let stored = definition_repository::find_checksum(&mut conn, kind, uid).await?;

        if stored.as_deref() == Some(checksum.as_str()) {
            if let Some(definition) = definition_repository::find(&mut conn, kind, uid).await? {
                tracing::debug!("Definition {} '{}' is up to date", kind, uid);
                return Ok(definition);
            }
        }
        drop(conn);

        let file = parse(&path, &bytes)?;
        validate(&file, uid)?;

        let mut tx = self.pool.begin().await?;
        let id = definition_repository::upsert(&mut tx, kind, &file, &checksum).await?;
        tx.commit().await?;

        match stored {
            Some(_) => tracing::info!("Definition {} '{}' reloaded (checksum changed)", kind, uid),
            None => tracing::info!("Definition {} '{}' loaded into catalog", kind, uid),
        }

        let mut conn = self.pool.acquire().await?;
        definition_repository::find_by_id(&mut conn, id)
            .await?
            .ok_or_else(|| EngineError::DefinitionNotFound {
                kind,
                uid: uid.to_string(),
            })
    }

    /// Reads a definition file without touching the catalog
    pub async fn read(&self, kind: DefinitionKind, uid: &str) -> Result<DefinitionFile> {
        let path = self.layout.definition_path(kind, uid)?;
        let bytes = read_definition(&path, kind, uid).await?;
        parse(&path, &bytes)
    }

    /// Lists every readable definition of a kind present on disk, by uid
    pub async fn list(&self, kind: DefinitionKind) -> Result<Vec<DefinitionFile>> {
        let folder = match kind {
            DefinitionKind::Pipeline => &self.layout.pipelines_folder,
            DefinitionKind::Plot => &self.layout.plots_folder,
        };

        let mut entries = match tokio::fs::read_dir(folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Definition folder {} does not exist", folder.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(EngineError::filesystem(folder, e)),
        };

        let mut definitions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EngineError::filesystem(folder, e))?
        {
            let path = entry.path();
            let uid = match kind {
                DefinitionKind::Pipeline if path.is_dir() => entry.file_name(),
                DefinitionKind::Plot if path.extension().is_some_and(|e| e == "json") => {
                    match path.file_stem() {
                        Some(stem) => stem.to_os_string(),
                        None => continue,
                    }
                }
                _ => continue,
            };

            let Some(uid) = uid.to_str() else {
                continue;
            };

            match self.read(kind, uid).await {
                Ok(file) => definitions.push(file),
                Err(e) => tracing::warn!("Skipping {} '{}': {}", kind, uid, e),
            }
        }

        definitions.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(definitions)
    }
}

/// SHA-256 hex digest of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

async fn read_definition(path: &Path, kind: DefinitionKind, uid: &str) -> Result<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::DefinitionNotFound {
            kind,
            uid: uid.to_string(),
        }),
        Err(e) => Err(EngineError::filesystem(path, e)),
    }
}

fn parse(path: &Path, bytes: &[u8]) -> Result<DefinitionFile> {
    serde_json::from_slice(bytes).map_err(|source| EngineError::DefinitionParse {
        path: path.display().to_string(),
        source,
    })
}

fn validate(file: &DefinitionFile, uid: &str) -> Result<()> {
    let invalid = |reason: String| EngineError::InvalidDefinition {
        uid: uid.to_string(),
        reason,
    };

    if file.uid != uid {
        return Err(invalid(format!("file declares uid '{}'", file.uid)));
    }

    for (field, value) in [
        ("filename", &file.filename),
        ("executor", &file.executor),
        ("command", &file.command),
    ] {
        if value.trim().is_empty() {
            return Err(invalid(format!("{field} cannot be empty")));
        }
    }

    let mut seen = HashSet::new();
    for name in file.inputs.iter().map(|i| &i.name) {
        if name.is_empty() || !seen.insert(name.as_str()) {
            return Err(invalid(format!("input name '{name}' is empty or repeated")));
        }
    }

    let outputs = file.effective_outputs();
    let mut seen = HashSet::new();
    for name in outputs.iter().map(|o| &o.name) {
        if name.is_empty() || !seen.insert(name.as_str()) {
            return Err(invalid(format!("output name '{name}' is empty or repeated")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(uid: &str) -> DefinitionFile {
        serde_json::from_value(serde_json::json!({
            "uid": uid,
            "filename": "run.py",
            "name": "Run",
            "executor": "python",
            "command": "$input $output",
            "inputs": [{"name": "input", "type": "file"}],
            "outputs": [{"name": "output", "value": "result.txt"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_validate_accepts_well_formed_definition() {
        assert!(validate(&definition("p1"), "p1").is_ok());
    }

    #[test]
    fn test_validate_rejects_uid_mismatch() {
        let err = validate(&definition("other"), "p1").unwrap_err();
        assert!(matches!(err, EngineError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_validate_rejects_duplicate_inputs() {
        let mut file = definition("p1");
        file.inputs.push(file.inputs[0].clone());
        assert!(validate(&file, "p1").is_err());
    }

    #[test]
    fn test_validate_rejects_empty_command() {
        let mut file = definition("p1");
        file.command = "  ".to_string();
        assert!(validate(&file, "p1").is_err());
    }
}
