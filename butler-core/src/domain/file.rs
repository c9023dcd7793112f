//! Catalog file domain types

use serde::{Deserialize, Serialize};

use crate::domain::run::Owner;

/// A file known to the catalog
///
/// `path` is relative to the data root unless it is absolute. The engine
/// joins it with the compute host's root when building commands and with the
/// local mount when touching the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub owner: Owner,
    pub name: String,
    pub display_name: String,
    pub path: String,
    pub size_in_bytes: i64,
    pub mime_type: String,
    pub file_format: String,
    pub file_format_full: String,
    pub is_upload: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Fields needed to create a catalog file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub owner: Owner,
    pub name: String,
    pub path: String,
    pub size_in_bytes: i64,
    pub mime_type: String,
    pub file_format: String,
    pub file_format_full: String,
    pub is_upload: bool,
}
