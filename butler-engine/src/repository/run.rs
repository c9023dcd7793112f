//! Run Repository
//!
//! Handles all database operations related to runs, their parameters and
//! their input/output file associations.

use butler_core::domain::file::FileRecord;
use butler_core::domain::run::{
    FileAssociation, Owner, OwnerKind, Parameter, Run, RunKind, RunState,
};
use butler_core::dto::run::RunFile;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::decode_error;
use super::file::FileRow;

/// Create a new PENDING run and return its ID
pub async fn insert(
    conn: &mut SqliteConnection,
    kind: RunKind,
    owner: &Owner,
    definition_id: i64,
    definition_uid: &str,
) -> Result<i64, sqlx::Error> {
    let now = chrono::Utc::now();

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO runs (
            kind, owner_kind, owner_id, owner_key, definition_id,
            definition_uid, state, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(kind.as_str())
    .bind(owner.kind.as_str())
    .bind(owner.id)
    .bind(&owner.storage_key)
    .bind(definition_id)
    .bind(definition_uid)
    .bind(RunState::Pending.as_str())
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Store one scalar parameter of a run
pub async fn insert_parameter(
    conn: &mut SqliteConnection,
    run_id: i64,
    position: usize,
    parameter: &Parameter,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO run_parameters (run_id, position, name, value) VALUES (?, ?, ?, ?)")
        .bind(run_id)
        .bind(position as i64)
        .bind(&parameter.name)
        .bind(&parameter.value)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Associate an input file with a run; repeated associations are ignored
pub async fn insert_input_file(
    conn: &mut SqliteConnection,
    run_id: i64,
    file_id: i64,
    field_name: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO run_input_files (run_id, file_id, field_name) VALUES (?, ?, ?)",
    )
    .bind(run_id)
    .bind(file_id)
    .bind(field_name)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Associate a produced file with a run
pub async fn insert_output_file(
    conn: &mut SqliteConnection,
    run_id: i64,
    file_id: i64,
    field_name: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO run_output_files (run_id, file_id, field_name) VALUES (?, ?, ?)")
        .bind(run_id)
        .bind(file_id)
        .bind(field_name)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Record the queue handle of a dispatched run
pub async fn set_task_id(
    conn: &mut SqliteConnection,
    run_id: i64,
    task_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE runs SET task_id = ?, updated_at = ? WHERE id = ?")
        .bind(task_id)
        .bind(chrono::Utc::now())
        .bind(run_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Move a PENDING run to a terminal state
///
/// Returns false when the run is missing or already terminal, in which case
/// nothing was written.
pub async fn finish(
    conn: &mut SqliteConnection,
    run_id: i64,
    state: RunState,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET state = ?, updated_at = ?
        WHERE id = ? AND state = ?
        "#,
    )
    .bind(state.as_str())
    .bind(chrono::Utc::now())
    .bind(run_id)
    .bind(RunState::Pending.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Current state of a run
pub async fn find_state(
    conn: &mut SqliteConnection,
    run_id: i64,
) -> Result<Option<RunState>, sqlx::Error> {
    let state: Option<(String,)> = sqlx::query_as("SELECT state FROM runs WHERE id = ?")
        .bind(run_id)
        .fetch_optional(&mut *conn)
        .await?;

    state
        .map(|(s,)| RunState::parse(&s).ok_or_else(|| decode_error("state", &s)))
        .transpose()
}

/// Find a run by ID, with its parameters and file associations
pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Run>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT r.id, r.kind, r.owner_kind, r.owner_id, r.owner_key,
               r.definition_id, r.definition_uid, r.state, r.task_id,
               r.created_at, r.updated_at
        FROM runs r
        WHERE r.id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(load(conn, row).await?)),
        None => Ok(None),
    }
}

/// List the runs of an owner, newest first
pub async fn list_for_owner(
    conn: &mut SqliteConnection,
    owner_kind: OwnerKind,
    owner_id: i64,
) -> Result<Vec<Run>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(
        r#"
        SELECT r.id, r.kind, r.owner_kind, r.owner_id, r.owner_key,
               r.definition_id, r.definition_uid, r.state, r.task_id,
               r.created_at, r.updated_at
        FROM runs r
        WHERE r.owner_kind = ? AND r.owner_id = ?
        ORDER BY r.id DESC
        "#,
    )
    .bind(owner_kind.as_str())
    .bind(owner_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut runs = Vec::with_capacity(rows.len());
    for row in rows {
        runs.push(load(conn, row).await?);
    }
    Ok(runs)
}

/// Input files of a run with the field each is bound to
pub async fn list_input_files(
    conn: &mut SqliteConnection,
    run_id: i64,
) -> Result<Vec<RunFile>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunFileRow>(
        r#"
        SELECT a.field_name, f.id, f.owner_kind, f.owner_id, f.owner_key, f.name,
               f.display_name, f.path, f.size_in_bytes, f.mime_type,
               f.file_format, f.file_format_full, f.is_upload, f.created_at
        FROM run_input_files a
        JOIN files f ON f.id = a.file_id
        WHERE a.run_id = ?
        ORDER BY a.field_name ASC, f.id ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// Output files of a run with the field each is bound to
pub async fn list_output_files(
    conn: &mut SqliteConnection,
    run_id: i64,
) -> Result<Vec<RunFile>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunFileRow>(
        r#"
        SELECT a.field_name, f.id, f.owner_kind, f.owner_id, f.owner_key, f.name,
               f.display_name, f.path, f.size_in_bytes, f.mime_type,
               f.file_format, f.file_format_full, f.is_upload, f.created_at
        FROM run_output_files a
        JOIN files f ON f.id = a.file_id
        WHERE a.run_id = ?
        ORDER BY f.id ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// Delete a run; parameters and associations go with it
pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM runs WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn load(conn: &mut SqliteConnection, row: RunRow) -> Result<Run, sqlx::Error> {
    let parameters: Vec<(String, String)> = sqlx::query_as(
        "SELECT name, value FROM run_parameters WHERE run_id = ? ORDER BY position ASC",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let input_files: Vec<(i64, String)> = sqlx::query_as(
        "SELECT file_id, field_name FROM run_input_files WHERE run_id = ? ORDER BY field_name, file_id",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let output_files: Vec<(i64, String)> = sqlx::query_as(
        "SELECT file_id, field_name FROM run_output_files WHERE run_id = ? ORDER BY file_id",
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let associate = |(file_id, field_name): (i64, String)| FileAssociation {
        run_id: row.id,
        file_id,
        field_name,
    };

    Ok(Run {
        id: row.id,
        kind: RunKind::parse(&row.kind).ok_or_else(|| decode_error("kind", &row.kind))?,
        owner: Owner {
            kind: OwnerKind::parse(&row.owner_kind)
                .ok_or_else(|| decode_error("owner_kind", &row.owner_kind))?,
            id: row.owner_id,
            storage_key: row.owner_key.clone(),
        },
        definition_id: row.definition_id,
        definition_uid: row.definition_uid.clone(),
        state: RunState::parse(&row.state).ok_or_else(|| decode_error("state", &row.state))?,
        task_id: row.task_id,
        parameters: parameters
            .into_iter()
            .map(|(name, value)| Parameter { name, value })
            .collect(),
        input_files: input_files.into_iter().map(associate).collect(),
        output_files: output_files.into_iter().map(associate).collect(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    id: i64,
    kind: String,
    owner_kind: String,
    owner_id: i64,
    owner_key: String,
    definition_id: i64,
    definition_uid: String,
    state: String,
    task_id: Option<Uuid>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(sqlx::FromRow)]
struct RunFileRow {
    field_name: String,
    #[sqlx(flatten)]
    file: FileRow,
}

impl TryFrom<RunFileRow> for RunFile {
    type Error = sqlx::Error;

    fn try_from(row: RunFileRow) -> Result<Self, Self::Error> {
        let file: FileRecord = row.file.try_into()?;
        Ok(RunFile {
            field_name: row.field_name,
            file,
        })
    }
}
