//! Failure Recorder
//!
//! Keeps the captured output of a failed run next to its other files and
//! marks the run FAILURE.

use std::path::Path;

use butler_core::domain::run::RunState;
use sqlx::SqlitePool;

use crate::error::{EngineError, Result};
use crate::executor::PipelineFailure;
use crate::repository::run_repository;

/// Captured stdout of a failed run
pub const STDOUT_LOG: &str = "log.out";
/// Captured stderr of a failed run
pub const STDERR_LOG: &str = "error.out";

/// Writes `log.out` and `error.out` into the run folder, then moves the run
/// to FAILURE. Returns false when the run was already terminal.
pub async fn record(
    pool: &SqlitePool,
    run_id: i64,
    run_dir: &Path,
    failure: &PipelineFailure,
) -> Result<bool> {
    tokio::fs::create_dir_all(run_dir)
        .await
        .map_err(|e| EngineError::filesystem(run_dir, e))?;

    for (name, content) in [(STDOUT_LOG, &failure.stdout), (STDERR_LOG, &failure.stderr)] {
        let path = run_dir.join(name);
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| EngineError::filesystem(&path, e))?;
    }

    let mut conn = pool.acquire().await?;
    let finished = run_repository::finish(&mut conn, run_id, RunState::Failure).await?;

    if finished {
        tracing::warn!(
            "Run {} failed with exit code {}; logs in {}",
            run_id,
            failure.exit_code,
            run_dir.display()
        );
    }

    Ok(finished)
}
