//! Shared handler state

use std::sync::Arc;

use butler_engine::config::EngineConfig;
use butler_engine::queue::{SqliteTaskQueue, TaskQueue};
use butler_engine::service::{DefinitionStore, Dispatcher, RunService};
use sqlx::SqlitePool;

/// Services reachable from every handler
#[derive(Clone)]
pub struct AppState {
    pub definitions: DefinitionStore,
    pub runs: RunService,
    pub queue: Arc<dyn TaskQueue>,
}

impl AppState {
    /// Wires the engine services over one catalog pool
    pub fn new(pool: SqlitePool, config: &EngineConfig) -> Self {
        let definitions = DefinitionStore::new(pool.clone(), config.layout.clone());
        let queue: Arc<dyn TaskQueue> = Arc::new(SqliteTaskQueue::new(pool.clone()));
        let runs = RunService::new(
            pool,
            config.layout.clone(),
            definitions.clone(),
            Dispatcher::new(Arc::clone(&queue)),
        );

        Self {
            definitions,
            runs,
            queue,
        }
    }
}
