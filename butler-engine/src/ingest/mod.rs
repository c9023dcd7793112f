//! Artifact ingestion
//!
//! After a successful run, the files it left in its folder are matched to the
//! declared outputs, described, and catalogued as files of the run's owner.
//! Ingestion is split in two so that the slow part (walking and sniffing)
//! happens before the completion transaction opens:
//! - [`Ingestor::discover`] is blocking and touches only the filesystem
//! - [`Ingestor::ingest`] writes the catalog rows on the caller's connection

mod matcher;
mod sniff;

pub use matcher::{MatchedFile, discover, match_binding};
pub use sniff::{FileCommandSniffer, FormatDatabase, FormatSniffer, SniffedFormat};

use std::path::{Component, Path};
use std::sync::Arc;

use butler_core::domain::file::{FileRecord, NewFile};
use butler_core::domain::run::Owner;
use butler_core::domain::task::OutputBinding;
use sqlx::SqliteConnection;

use crate::error::{EngineError, Result};
use crate::repository::{file_repository, run_repository};

/// A produced file ready to be catalogued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub field: String,
    pub name: String,
    /// Path relative to the data root
    pub catalog_path: String,
    pub size_in_bytes: i64,
    pub mime_type: String,
    pub file_format: String,
    pub file_format_full: String,
}

#[derive(Clone)]
pub struct Ingestor {
    sniffer: Arc<dyn FormatSniffer>,
    formats: Arc<FormatDatabase>,
}

impl Ingestor {
    pub fn new(sniffer: Arc<dyn FormatSniffer>, formats: Arc<FormatDatabase>) -> Self {
        Self { sniffer, formats }
    }

    /// Matches and describes the files of a run folder
    ///
    /// `catalog_dir` is the same folder relative to the data root.
    pub fn discover(
        &self,
        run_dir: &Path,
        catalog_dir: &str,
        bindings: &[OutputBinding],
    ) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::new();

        for matched in discover(run_dir, bindings)? {
            let metadata = std::fs::metadata(&matched.path)
                .map_err(|e| EngineError::filesystem(&matched.path, e))?;
            let sniffed = self.sniffer.sniff(&matched.path)?;

            let name = matched
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            artifacts.push(Artifact {
                field: matched.field,
                file_format: self.formats.short_format(&sniffed.description, &name),
                catalog_path: catalog_path(catalog_dir, &matched.relative),
                name,
                size_in_bytes: metadata.len() as i64,
                mime_type: sniffed.mime_type,
                file_format_full: sniffed.description,
            });
        }

        Ok(artifacts)
    }

    /// Catalogues artifacts as outputs of a run
    ///
    /// Must run inside the transaction that marks the run successful.
    pub async fn ingest(
        &self,
        conn: &mut SqliteConnection,
        run_id: i64,
        owner: &Owner,
        artifacts: &[Artifact],
    ) -> Result<Vec<FileRecord>> {
        let mut records = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            let record = file_repository::insert(
                &mut *conn,
                &NewFile {
                    owner: owner.clone(),
                    name: artifact.name.clone(),
                    path: artifact.catalog_path.clone(),
                    size_in_bytes: artifact.size_in_bytes,
                    mime_type: artifact.mime_type.clone(),
                    file_format: artifact.file_format.clone(),
                    file_format_full: artifact.file_format_full.clone(),
                    is_upload: false,
                },
            )
            .await?;

            run_repository::insert_output_file(&mut *conn, run_id, record.id, &artifact.field)
                .await?;

            tracing::info!(
                "Run {}: catalogued {} as output '{}' (file {})",
                run_id,
                artifact.catalog_path,
                artifact.field,
                record.id
            );
            records.push(record);
        }

        Ok(records)
    }
}

fn catalog_path(catalog_dir: &str, relative: &Path) -> String {
    let mut path = catalog_dir.trim_end_matches('/').to_string();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            path.push('/');
            path.push_str(&part.to_string_lossy());
        }
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSniffer;

    impl FormatSniffer for FixedSniffer {
        fn sniff(&self, _path: &Path) -> Result<SniffedFormat> {
            Ok(SniffedFormat {
                mime_type: "text/plain".to_string(),
                description: "ASCII text".to_string(),
            })
        }
    }

    #[test]
    fn test_catalog_path() {
        assert_eq!(
            catalog_path("alice/analyses/3/", Path::new("figures/a.png")),
            "alice/analyses/3/figures/a.png"
        );
    }

    #[test]
    fn test_discover_describes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("result.txt"), "hello").unwrap();

        let ingestor = Ingestor::new(
            Arc::new(FixedSniffer),
            Arc::new(FormatDatabase::from_json(r#"{"ASCII": "ascii"}"#).unwrap()),
        );
        let artifacts = ingestor
            .discover(
                dir.path(),
                "alice/analyses/3",
                &[OutputBinding::new("output", "result.txt")],
            )
            .unwrap();

        assert_eq!(
            artifacts,
            vec![Artifact {
                field: "output".to_string(),
                name: "result.txt".to_string(),
                catalog_path: "alice/analyses/3/result.txt".to_string(),
                size_in_bytes: 5,
                mime_type: "text/plain".to_string(),
                file_format: "ascii".to_string(),
                file_format_full: "ASCII text".to_string(),
            }]
        );
    }
}
