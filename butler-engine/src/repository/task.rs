//! Task Repository
//!
//! Handles all database operations on the durable task queue.

use butler_core::domain::run::RunKind;
use butler_core::domain::task::{OutputBinding, Task, TaskDescription, TaskState};
use sqlx::SqliteConnection;
use sqlx::types::Json;
use uuid::Uuid;

use super::decode_error;

/// Append a task to the queue
pub async fn insert(
    conn: &mut SqliteConnection,
    description: &TaskDescription,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO tasks (
            id, run_id, run_kind, definition_id, command, output_bindings,
            state, enqueued_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(description.id)
    .bind(description.run_id)
    .bind(description.run_kind.as_str())
    .bind(description.definition_id)
    .bind(&description.command)
    .bind(Json(&description.output_bindings))
    .bind(TaskState::Queued.as_str())
    .bind(chrono::Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Claim the oldest queued task for a worker
///
/// The select and the update are one statement, so two workers can never
/// claim the same task.
pub async fn claim_next(
    conn: &mut SqliteConnection,
    worker_id: &str,
) -> Result<Option<Task>, sqlx::Error> {
    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        UPDATE tasks
        SET state = ?, worker_id = ?, started_at = ?
        WHERE id = (
            SELECT id FROM tasks
            WHERE state = ?
            ORDER BY enqueued_at ASC, rowid ASC
            LIMIT 1
        )
        RETURNING id, run_id, run_kind, definition_id, command, output_bindings,
                  state, worker_id, error_message, enqueued_at, started_at, finished_at
        "#,
    )
    .bind(TaskState::Started.as_str())
    .bind(worker_id)
    .bind(chrono::Utc::now())
    .bind(TaskState::Queued.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(TryInto::try_into).transpose()
}

/// Record the final delivery state of a task
pub async fn finish(
    conn: &mut SqliteConnection,
    id: Uuid,
    state: TaskState,
    error_message: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET state = ?, error_message = ?, finished_at = ?
        WHERE id = ?
        "#,
    )
    .bind(state.as_str())
    .bind(error_message)
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Put tasks claimed before `started_before` and never finished back in the queue
pub async fn requeue_stale(
    conn: &mut SqliteConnection,
    started_before: chrono::DateTime<chrono::Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET state = ?, worker_id = NULL, started_at = NULL
        WHERE state = ? AND started_at < ?
        "#,
    )
    .bind(TaskState::Queued.as_str())
    .bind(TaskState::Started.as_str())
    .bind(started_before)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Find a task by ID
pub async fn find_by_id(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<Task>, sqlx::Error> {
    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, run_id, run_kind, definition_id, command, output_bindings,
               state, worker_id, error_message, enqueued_at, started_at, finished_at
        FROM tasks
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(TryInto::try_into).transpose()
}

/// Delete a task that was never picked up
pub async fn delete_queued(conn: &mut SqliteConnection, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND state = ?")
        .bind(id)
        .bind(TaskState::Queued.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    run_id: i64,
    run_kind: String,
    definition_id: i64,
    command: String,
    output_bindings: Json<Vec<OutputBinding>>,
    state: String,
    worker_id: Option<String>,
    error_message: Option<String>,
    enqueued_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = sqlx::Error;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            description: TaskDescription {
                id: row.id,
                run_id: row.run_id,
                run_kind: RunKind::parse(&row.run_kind)
                    .ok_or_else(|| decode_error("run_kind", &row.run_kind))?,
                definition_id: row.definition_id,
                command: row.command,
                output_bindings: row.output_bindings.0,
            },
            state: TaskState::parse(&row.state).ok_or_else(|| decode_error("state", &row.state))?,
            worker_id: row.worker_id,
            error_message: row.error_message,
            enqueued_at: row.enqueued_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}
