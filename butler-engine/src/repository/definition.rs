//! Definition Repository
//!
//! Handles all database operations related to pipeline and plot definitions.

use butler_core::domain::definition::{Definition, DefinitionKind, InputSpec, OutputSpec};
use butler_core::dto::definition::DefinitionFile;
use sqlx::SqliteConnection;

use super::decode_error;

/// Insert or replace a definition and its declared inputs and outputs
///
/// Call inside a transaction: the input and output lists are deleted and recreated.
pub async fn upsert(
    conn: &mut SqliteConnection,
    kind: DefinitionKind,
    file: &DefinitionFile,
    checksum: &str,
) -> Result<i64, sqlx::Error> {
    let now = chrono::Utc::now();

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO definitions (
            kind, uid, filename, name, description, executor, command,
            checksum, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (kind, uid) DO UPDATE SET
            filename = excluded.filename,
            name = excluded.name,
            description = excluded.description,
            executor = excluded.executor,
            command = excluded.command,
            checksum = excluded.checksum,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(kind.as_str())
    .bind(&file.uid)
    .bind(&file.filename)
    .bind(&file.name)
    .bind(&file.description)
    .bind(&file.executor)
    .bind(&file.command)
    .bind(checksum)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM definition_inputs WHERE definition_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM definition_outputs WHERE definition_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    for (position, input) in file.inputs.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO definition_inputs (
                definition_id, position, name, label, help, input_type,
                multiple, format, required
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(position as i64)
        .bind(&input.name)
        .bind(&input.label)
        .bind(&input.help)
        .bind(&input.input_type)
        .bind(input.multiple)
        .bind(&input.format)
        .bind(input.required)
        .execute(&mut *conn)
        .await?;
    }

    for (position, output) in file.effective_outputs().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO definition_outputs (
                definition_id, position, name, label, output_type, value, format
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(position as i64)
        .bind(&output.name)
        .bind(&output.label)
        .bind(&output.output_type)
        .bind(&output.value)
        .bind(&output.format)
        .execute(&mut *conn)
        .await?;
    }

    Ok(id)
}

/// Find a definition by catalog kind and uid
pub async fn find(
    conn: &mut SqliteConnection,
    kind: DefinitionKind,
    uid: &str,
) -> Result<Option<Definition>, sqlx::Error> {
    let row = sqlx::query_as::<_, DefinitionRow>(
        r#"
        SELECT id, kind, uid, filename, name, description, executor, command,
               checksum, created_at, updated_at
        FROM definitions
        WHERE kind = ? AND uid = ?
        "#,
    )
    .bind(kind.as_str())
    .bind(uid)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(load(conn, row).await?)),
        None => Ok(None),
    }
}

/// Find a definition by ID
pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<Definition>, sqlx::Error> {
    let row = sqlx::query_as::<_, DefinitionRow>(
        r#"
        SELECT id, kind, uid, filename, name, description, executor, command,
               checksum, created_at, updated_at
        FROM definitions
        WHERE id = ?
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

/// Checksum currently stored for a definition
pub async fn find_checksum(
    conn: &mut SqliteConnection,
    kind: DefinitionKind,
    uid: &str,
) -> Result<Option<String>, sqlx::Error> {
    let checksum: Option<(String,)> =
        sqlx::query_as("SELECT checksum FROM definitions WHERE kind = ? AND uid = ?")
            .bind(kind.as_str())
            .bind(uid)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(checksum.map(|(c,)| c))
}

/// List every catalogued definition of a kind
pub async fn list(
    conn: &mut SqliteConnection,
    kind: DefinitionKind,
) -> Result<Vec<Definition>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DefinitionRow>(
        r#"
        SELECT id, kind, uid, filename, name, description, executor, command,
               checksum, created_at, updated_at
        FROM definitions
        WHERE kind = ?
        ORDER BY uid ASC
        "#,
    )
    .bind(kind.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let mut definitions = Vec::with_capacity(rows.len());
    for row in rows {
        definitions.push(load(conn, row).await?);
    }
    Ok(definitions)
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn load(conn: &mut SqliteConnection, row: DefinitionRow) -> Result<Definition, sqlx::Error> {
    let inputs = sqlx::query_as::<_, InputRow>(
        r#"
        SELECT name, label, help, input_type, multiple, format, required
        FROM definition_inputs
        WHERE definition_id = ?
        ORDER BY position ASC
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let outputs = sqlx::query_as::<_, OutputRow>(
        r#"
        SELECT name, label, output_type, value, format
        FROM definition_outputs
        WHERE definition_id = ?
        ORDER BY position ASC
        "#,
    )
    .bind(row.id)
    .fetch_all(&mut *conn)
    .await?;

    let kind = DefinitionKind::parse(&row.kind).ok_or_else(|| decode_error("kind", &row.kind))?;

    Ok(Definition {
        id: row.id,
        kind,
        uid: row.uid,
        filename: row.filename,
        name: row.name,
        description: row.description,
        executor: row.executor,
        command: row.command,
        checksum: row.checksum,
        inputs: inputs.into_iter().map(Into::into).collect(),
        outputs: outputs.into_iter().map(Into::into).collect(),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DefinitionRow {
    id: i64,
    kind: String,
    uid: String,
    filename: String,
    name: String,
    description: String,
    executor: String,
    command: String,
    checksum: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(sqlx::FromRow)]
struct InputRow {
    name: String,
    label: String,
    help: String,
    input_type: String,
    multiple: bool,
    format: String,
    required: bool,
}

impl From<InputRow> for InputSpec {
    fn from(row: InputRow) -> Self {
        InputSpec {
            name: row.name,
            label: row.label,
            help: row.help,
            input_type: row.input_type,
            multiple: row.multiple,
            format: row.format,
            required: row.required,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OutputRow {
    name: String,
    label: String,
    output_type: String,
    value: String,
    format: String,
}

impl From<OutputRow> for OutputSpec {
    fn from(row: OutputRow) -> Self {
        OutputSpec {
            name: row.name,
            label: row.label,
            output_type: row.output_type,
            value: row.value,
            format: row.format,
        }
    }
}
