use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Opens the catalog database, creating the file when missing
///
/// WAL mode plus a busy timeout lets the orchestrator and any number of
/// runner processes share one database file.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Definitions, one row per (kind, uid)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS definitions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            uid TEXT NOT NULL,
            filename TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            executor TEXT NOT NULL,
            command TEXT NOT NULL,
            checksum TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (kind, uid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS definition_inputs (
            definition_id INTEGER NOT NULL REFERENCES definitions(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            help TEXT NOT NULL DEFAULT '',
            input_type TEXT NOT NULL,
            multiple INTEGER NOT NULL DEFAULT 0,
            format TEXT NOT NULL DEFAULT '',
            required INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (definition_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS definition_outputs (
            definition_id INTEGER NOT NULL REFERENCES definitions(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT '',
            output_type TEXT NOT NULL DEFAULT '',
            value TEXT NOT NULL,
            format TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (definition_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Catalog files, uploads and run outputs alike
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_kind TEXT NOT NULL,
            owner_id INTEGER NOT NULL,
            owner_key TEXT NOT NULL,
            name TEXT NOT NULL,
            display_name TEXT NOT NULL,
            path TEXT NOT NULL,
            size_in_bytes INTEGER NOT NULL DEFAULT 0,
            mime_type TEXT NOT NULL DEFAULT '',
            file_format TEXT NOT NULL DEFAULT '',
            file_format_full TEXT NOT NULL DEFAULT '',
            is_upload INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            owner_kind TEXT NOT NULL,
            owner_id INTEGER NOT NULL,
            owner_key TEXT NOT NULL,
            definition_id INTEGER NOT NULL REFERENCES definitions(id),
            definition_uid TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'PENDING',
            task_id BLOB,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_parameters (
            run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (run_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_input_files (
            run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
            field_name TEXT NOT NULL,
            PRIMARY KEY (run_id, file_id, field_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // A catalog file is the output of at most one run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_output_files (
            run_id INTEGER NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            file_id INTEGER NOT NULL UNIQUE REFERENCES files(id) ON DELETE CASCADE,
            field_name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Task queue; deliberately not tied to runs so a deleted run leaves its
    // task record readable for status polling
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id BLOB PRIMARY KEY,
            run_id INTEGER NOT NULL,
            run_kind TEXT NOT NULL,
            definition_id INTEGER NOT NULL,
            command TEXT NOT NULL,
            output_bindings TEXT NOT NULL DEFAULT '[]',
            state TEXT NOT NULL DEFAULT 'QUEUED',
            worker_id TEXT,
            error_message TEXT,
            enqueued_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_owner ON runs(owner_kind, owner_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_state ON runs(state)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_owner ON files(owner_kind, owner_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_run_output_files_run ON run_output_files(run_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(state, enqueued_at)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
        let pool = create_pool(&url).await.unwrap();

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('definitions', 'runs', 'tasks')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 3);
    }
}
