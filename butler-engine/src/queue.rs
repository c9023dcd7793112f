//! Durable task queue
//!
//! Decouples submission from execution: the orchestrator enqueues, runner
//! processes claim. The shipped [`SqliteTaskQueue`] keeps tasks in the
//! catalog database so both sides only share the database file.

use async_trait::async_trait;
use butler_core::domain::task::{Task, TaskDescription, TaskState};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::repository::task_repository;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Appends a task; it becomes claimable immediately
    async fn enqueue(&self, description: &TaskDescription) -> Result<()>;

    /// Atomically moves the oldest QUEUED task to STARTED for `worker_id`
    async fn claim(&self, worker_id: &str) -> Result<Option<Task>>;

    /// Records the final delivery state of a claimed task
    async fn finish(&self, id: Uuid, state: TaskState, error: Option<&str>) -> Result<()>;

    async fn status(&self, id: Uuid) -> Result<Task>;

    /// Returns STARTED tasks claimed longer than `older_than` ago to the queue
    async fn requeue_stale(&self, older_than: std::time::Duration) -> Result<u64>;

    /// Withdraws a task nobody has claimed yet
    async fn withdraw(&self, id: Uuid) -> Result<bool>;
}

#[derive(Clone)]
pub struct SqliteTaskQueue {
    pool: SqlitePool,
}

impl SqliteTaskQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueue for SqliteTaskQueue {
    async fn enqueue(&self, description: &TaskDescription) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        task_repository::insert(&mut conn, description).await?;
        tracing::debug!("Task {} enqueued for run {}", description.id, description.run_id);
        Ok(())
    }

    async fn claim(&self, worker_id: &str) -> Result<Option<Task>> {
        let mut conn = self.pool.acquire().await?;
        Ok(task_repository::claim_next(&mut conn, worker_id).await?)
    }

    async fn finish(&self, id: Uuid, state: TaskState, error: Option<&str>) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        if !task_repository::finish(&mut conn, id, state, error).await? {
            return Err(EngineError::TaskNotFound(id));
        }
        Ok(())
    }

    async fn status(&self, id: Uuid) -> Result<Task> {
        let mut conn = self.pool.acquire().await?;
        task_repository::find_by_id(&mut conn, id)
            .await?
            .ok_or(EngineError::TaskNotFound(id))
    }

    async fn requeue_stale(&self, older_than: std::time::Duration) -> Result<u64> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| EngineError::Config(format!("redelivery delay out of range: {e}")))?;
        let mut conn = self.pool.acquire().await?;
        let requeued = task_repository::requeue_stale(&mut conn, chrono::Utc::now() - age).await?;
        if requeued > 0 {
            tracing::warn!("Requeued {} stale task(s)", requeued);
        }
        Ok(requeued)
    }

    async fn withdraw(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        Ok(task_repository::delete_queued(&mut conn, id).await?)
    }
}
