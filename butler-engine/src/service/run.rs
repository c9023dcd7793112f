//! Run Service
//!
//! Creates runs from submissions and serves their state and files. A run is
//! inserted, given its folder and dispatched as one procedure: if any step
//! fails, nothing of the run is left behind.

use std::collections::HashMap;
use std::path::Path;

use butler_core::domain::file::FileRecord;
use butler_core::domain::run::{OwnerKind, Run, RunKind};
use butler_core::dto::run::{RunFile, RunStatus, Submission, SubmitRun};
use sqlx::SqlitePool;

use crate::config::StorageLayout;
use crate::error::{EngineError, Result};
use crate::repository::{file_repository, run_repository};
use crate::service::definition::DefinitionStore;
use crate::service::dispatch::{DispatchMetadata, Dispatcher};
use crate::service::template;

#[derive(Clone)]
pub struct RunService {
    pool: SqlitePool,
    layout: StorageLayout,
    definitions: DefinitionStore,
    dispatcher: Dispatcher,
}

impl RunService {
    pub fn new(
        pool: SqlitePool,
        layout: StorageLayout,
        definitions: DefinitionStore,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            pool,
            layout,
            definitions,
            dispatcher,
        }
    }

    /// Creates a run, prepares its folder and dispatches it
    ///
    /// Returns as soon as the task is queued. Definition and parameter errors
    /// are reported here and nothing is persisted for them.
    pub async fn submit(&self, kind: RunKind, request: SubmitRun) -> Result<Submission> {
        let owner = request.owner;
        crate::config::check_segment(&owner.storage_key)?;

        let definition = self
            .definitions
            .load(kind.definition_kind(), &request.definition_uid)
            .await?;

        let files = self
            .fetch_files(&template::referenced_file_ids(&definition, &request.parameters))
            .await?;
        let resolved = template::resolve(&definition, &request.parameters, &files, &self.layout)?;

        let mut tx = self.pool.begin().await?;

        let run_id =
            run_repository::insert(&mut tx, kind, &owner, definition.id, &definition.uid).await?;

        for (position, parameter) in resolved.scalars.iter().enumerate() {
            run_repository::insert_parameter(&mut tx, run_id, position, parameter).await?;
        }

        for input in &resolved.inputs {
            run_repository::insert_input_file(&mut tx, run_id, input.file_id, &input.field)
                .await?;
        }

        let remote_dir = self.layout.remote_run_dir(&owner, kind, run_id)?;
        let plan = template::render(&definition, &resolved, &self.layout, &remote_dir)?;

        let local_dir = self.layout.local_run_dir(&owner, kind, run_id)?;
        tokio::fs::create_dir_all(&local_dir)
            .await
            .map_err(|e| EngineError::filesystem(&local_dir, e))?;

        if let Err(e) = tx.commit().await {
            remove_run_dir(&local_dir).await;
            return Err(e.into());
        }

        tracing::info!(
            "Run {} created for {} '{}' in {}",
            run_id,
            kind,
            definition.uid,
            local_dir.display()
        );
        tracing::debug!("Run {} command: {}", run_id, plan.command);

        let metadata = DispatchMetadata {
            run_id,
            run_kind: kind,
            definition_id: definition.id,
            output_bindings: plan.output_bindings,
        };

        let task_id = match self.dispatcher.submit(plan.command, metadata).await {
            Ok(task_id) => task_id,
            Err(e) => {
                tracing::error!("Dispatch of run {} failed: {}", run_id, e);
                self.discard(run_id, &local_dir).await;
                return Err(e);
            }
        };

        let recorded = async {
            let mut conn = self.pool.acquire().await?;
            run_repository::set_task_id(&mut conn, run_id, task_id).await?;
            run_repository::find_by_id(&mut conn, run_id)
                .await?
                .ok_or(EngineError::RunNotFound(run_id))
        }
        .await;

        match recorded {
            Ok(run) => Ok(Submission { run, task_id }),
            Err(e) => {
                tracing::error!("Recording task {} on run {} failed: {}", task_id, run_id, e);
                if let Err(withdraw_err) = self.dispatcher.queue().withdraw(task_id).await {
                    tracing::warn!("Failed to withdraw task {}: {}", task_id, withdraw_err);
                }
                self.discard(run_id, &local_dir).await;
                Err(e)
            }
        }
    }

    /// Get a run by ID
    pub async fn get(&self, run_id: i64) -> Result<Run> {
        let mut conn = self.pool.acquire().await?;
        run_repository::find_by_id(&mut conn, run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))
    }

    pub async fn status(&self, run_id: i64) -> Result<RunStatus> {
        let mut conn = self.pool.acquire().await?;
        let state = run_repository::find_state(&mut conn, run_id)
            .await?
            .ok_or(EngineError::RunNotFound(run_id))?;

        Ok(RunStatus { run_id, state })
    }

    /// List the runs of an owner, newest first
    pub async fn list_for_owner(&self, owner_kind: OwnerKind, owner_id: i64) -> Result<Vec<Run>> {
        let mut conn = self.pool.acquire().await?;
        Ok(run_repository::list_for_owner(&mut conn, owner_kind, owner_id).await?)
    }

    pub async fn input_files(&self, run_id: i64) -> Result<Vec<RunFile>> {
        let mut conn = self.pool.acquire().await?;
        ensure_exists(&mut conn, run_id).await?;
        Ok(run_repository::list_input_files(&mut conn, run_id).await?)
    }

    pub async fn output_files(&self, run_id: i64) -> Result<Vec<RunFile>> {
        let mut conn = self.pool.acquire().await?;
        ensure_exists(&mut conn, run_id).await?;
        Ok(run_repository::list_output_files(&mut conn, run_id).await?)
    }

    /// Deletes a run, the catalog files it produced and its folder
    ///
    /// A task that was never claimed is withdrawn from the queue. The folder
    /// is removed after the catalog change commits; failing to remove it is
    /// logged and otherwise ignored.
    pub async fn delete(&self, run_id: i64) -> Result<()> {
        let run = self.get(run_id).await?;

        let mut tx = self.pool.begin().await?;
        let outputs = file_repository::delete_outputs_of_run(&mut tx, run_id).await?;
        if !run_repository::delete(&mut tx, run_id).await? {
            return Err(EngineError::RunNotFound(run_id));
        }
        tx.commit().await?;

        tracing::info!("Run {} deleted with {} output file(s)", run_id, outputs);

        if let Some(task_id) = run.task_id {
            if let Err(e) = self.dispatcher.queue().withdraw(task_id).await {
                tracing::warn!("Failed to withdraw task {}: {}", task_id, e);
            }
        }

        let local_dir = self.layout.local_run_dir(&run.owner, run.kind, run.id)?;
        remove_run_dir(&local_dir).await;
        Ok(())
    }

    /// Undoes a committed run that could not be dispatched
    async fn discard(&self, run_id: i64, local_dir: &Path) {
        let deleted = async {
            let mut conn = self.pool.acquire().await?;
            run_repository::delete(&mut conn, run_id).await
        }
        .await;

        if let Err(e) = deleted {
            tracing::error!("Failed to remove undispatched run {}: {}", run_id, e);
        }
        remove_run_dir(local_dir).await;
    }

    async fn fetch_files(&self, ids: &[i64]) -> Result<HashMap<i64, FileRecord>> {
        let mut conn = self.pool.acquire().await?;
        let mut files = HashMap::new();
        for &id in ids {
            if files.contains_key(&id) {
                continue;
            }
            if let Some(file) = file_repository::find_by_id(&mut conn, id).await? {
                files.insert(id, file);
            }
        }
        Ok(files)
    }
}

async fn ensure_exists(conn: &mut sqlx::SqliteConnection, run_id: i64) -> Result<()> {
    match run_repository::find_state(conn, run_id).await? {
        Some(_) => Ok(()),
        None => Err(EngineError::RunNotFound(run_id)),
    }
}

async fn remove_run_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => tracing::debug!("Removed run folder {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove run folder {}: {}", dir.display(), e),
    }
}
