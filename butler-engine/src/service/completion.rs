//! Completion handling
//!
//! Consumes the outcome of a task's remote command and moves its run to a
//! terminal state. Completion is idempotent: a run that is no longer PENDING
//! is reported as [`Completion::AlreadyCompleted`] and left untouched, so a
//! redelivered task never changes state twice or duplicates outputs.

use std::sync::Arc;

use butler_core::domain::file::FileRecord;
use butler_core::domain::run::{Run, RunState};
use butler_core::domain::task::TaskDescription;
use sqlx::SqlitePool;

use crate::config::StorageLayout;
use crate::error::{EngineError, Result};
use crate::executor::ExecutionOutcome;
use crate::ingest::Ingestor;
use crate::repository::run_repository;
use crate::service::failure;

/// What completing a task did to its run
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// Run is now SUCCESS with these catalogued outputs
    Succeeded { outputs: Vec<FileRecord> },
    /// Run is now FAILURE
    Failed { exit_code: i32 },
    /// Run had already reached this state; nothing was written
    AlreadyCompleted(RunState),
}

#[derive(Clone)]
pub struct CompletionHandler {
    pool: SqlitePool,
    layout: StorageLayout,
    ingestor: Arc<Ingestor>,
}

impl CompletionHandler {
    pub fn new(pool: SqlitePool, layout: StorageLayout, ingestor: Ingestor) -> Self {
        Self {
            pool,
            layout,
            ingestor: Arc::new(ingestor),
        }
    }

    /// Applies an execution outcome to the task's run
    pub async fn complete(
        &self,
        task: &TaskDescription,
        outcome: ExecutionOutcome,
    ) -> Result<Completion> {
        let run = {
            let mut conn = self.pool.acquire().await?;
            run_repository::find_by_id(&mut conn, task.run_id)
                .await?
                .ok_or(EngineError::RunNotFound(task.run_id))?
        };

        if run.state.is_terminal() {
            tracing::info!("Run {} already {}, ignoring redelivery", run.id, run.state);
            return Ok(Completion::AlreadyCompleted(run.state));
        }

        match outcome {
            ExecutionOutcome::Succeeded { stdout } => {
                if !stdout.is_empty() {
                    tracing::debug!("Run {} stdout: {}", run.id, stdout.trim_end());
                }
                self.succeed(&run, task).await
            }
            ExecutionOutcome::Failed(pipeline_failure) => {
                let run_dir = self.layout.local_run_dir(&run.owner, run.kind, run.id)?;
                if failure::record(&self.pool, run.id, &run_dir, &pipeline_failure).await? {
                    Ok(Completion::Failed {
                        exit_code: pipeline_failure.exit_code,
                    })
                } else {
                    self.already_completed(run.id).await
                }
            }
        }
    }

    async fn succeed(&self, run: &Run, task: &TaskDescription) -> Result<Completion> {
        let run_dir = self.layout.local_run_dir(&run.owner, run.kind, run.id)?;
        let catalog_dir = self.layout.run_relative_dir(&run.owner, run.kind, run.id)?;

        let ingestor = Arc::clone(&self.ingestor);
        let bindings = task.output_bindings.clone();
        let artifacts = tokio::task::spawn_blocking(move || {
            ingestor.discover(&run_dir, &catalog_dir, &bindings)
        })
        .await
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))??;

        // Conditional state write opens the transaction
        let mut tx = self.pool.begin().await?;
        if !run_repository::finish(&mut tx, run.id, RunState::Success).await? {
            tx.rollback().await?;
            return self.already_completed(run.id).await;
        }

        let outputs = self
            .ingestor
            .ingest(&mut tx, run.id, &run.owner, &artifacts)
            .await?;
        tx.commit().await?;

        tracing::info!(
            "Run {} succeeded with {} output file(s)",
            run.id,
            outputs.len()
        );

        Ok(Completion::Succeeded { outputs })
    }

    async fn already_completed(&self, run_id: i64) -> Result<Completion> {
        let mut conn = self.pool.acquire().await?;
        let state = run_repository::find_state(&mut conn, run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))?;
        Ok(Completion::AlreadyCompleted(state))
    }
}
