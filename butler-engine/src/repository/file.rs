//! File Repository
//!
//! Handles all database operations related to catalog files.

use butler_core::domain::file::{FileRecord, NewFile};
use butler_core::domain::run::{Owner, OwnerKind};
use sqlx::SqliteConnection;

use super::decode_error;

/// Create a catalog file
pub async fn insert(conn: &mut SqliteConnection, file: &NewFile) -> Result<FileRecord, sqlx::Error> {
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, FileRow>(
        r#"
        INSERT INTO files (
            owner_kind, owner_id, owner_key, name, display_name, path,
            size_in_bytes, mime_type, file_format, file_format_full,
            is_upload, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id, owner_kind, owner_id, owner_key, name, display_name, path,
                  size_in_bytes, mime_type, file_format, file_format_full,
                  is_upload, created_at
        "#,
    )
    .bind(file.owner.kind.as_str())
    .bind(file.owner.id)
    .bind(&file.owner.storage_key)
    .bind(&file.name)
    .bind(&file.name)
    .bind(&file.path)
    .bind(file.size_in_bytes)
    .bind(&file.mime_type)
    .bind(&file.file_format)
    .bind(&file.file_format_full)
    .bind(file.is_upload)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

/// Find a catalog file by ID
pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<FileRecord>, sqlx::Error> {
    let row = sqlx::query_as::<_, FileRow>(
        r#"
        SELECT id, owner_kind, owner_id, owner_key, name, display_name, path,
               size_in_bytes, mime_type, file_format, file_format_full,
               is_upload, created_at
        FROM files
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(TryInto::try_into).transpose()
}

/// Delete the catalog files produced by a run
///
/// Their output associations go with them.
pub async fn delete_outputs_of_run(
    conn: &mut SqliteConnection,
    run_id: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM files WHERE id IN (SELECT file_id FROM run_output_files WHERE run_id = ?)",
    )
    .bind(run_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    id: i64,
    owner_kind: String,
    owner_id: i64,
    owner_key: String,
    name: String,
    display_name: String,
    path: String,
    size_in_bytes: i64,
    mime_type: String,
    file_format: String,
    file_format_full: String,
    is_upload: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = sqlx::Error;

    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let kind = OwnerKind::parse(&row.owner_kind)
            .ok_or_else(|| decode_error("owner_kind", &row.owner_kind))?;

        Ok(FileRecord {
            id: row.id,
            owner: Owner {
                kind,
                id: row.owner_id,
                storage_key: row.owner_key,
            },
            name: row.name,
            display_name: row.display_name,
            path: row.path,
            size_in_bytes: row.size_in_bytes,
            mime_type: row.mime_type,
            file_format: row.file_format,
            file_format_full: row.file_format_full,
            is_upload: row.is_upload,
            created_at: row.created_at,
        })
    }
}
