//! Task poller
//!
//! Polls the task queue and executes claimed tasks, one blocking remote
//! command per permit of a semaphore sized by `max_parallel_tasks`.

use std::sync::Arc;

use butler_core::domain::task::{Task, TaskState};
use tokio::sync::Semaphore;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::executor::{self, RemoteChannel};
use crate::queue::TaskQueue;
use crate::service::completion::{Completion, CompletionHandler};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Identifier recorded on claimed tasks
    pub worker_id: String,
    pub poll_interval: Duration,
    pub max_parallel_tasks: usize,
    /// Requeue tasks STARTED longer than this; never when `None`
    pub redelivery_after: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            worker_id: "worker".to_string(),
            poll_interval: Duration::from_secs(2),
            max_parallel_tasks: 4,
            redelivery_after: None,
        }
    }
}

/// Task poller that continuously claims and executes tasks
pub struct TaskPoller {
    config: PollerConfig,
    queue: Arc<dyn TaskQueue>,
    channel: Arc<dyn RemoteChannel>,
    completion: CompletionHandler,
    semaphore: Arc<Semaphore>,
}

impl TaskPoller {
    pub fn new(
        config: PollerConfig,
        queue: Arc<dyn TaskQueue>,
        channel: Arc<dyn RemoteChannel>,
        completion: CompletionHandler,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_tasks.max(1)));
        Self {
            config,
            queue,
            channel,
            completion,
            semaphore,
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting task poller {} (interval: {:?}, slots: {})",
            self.config.worker_id, self.config.poll_interval, self.config.max_parallel_tasks
        );

        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;

            if let Some(after) = self.config.redelivery_after {
                if let Err(e) = self.queue.requeue_stale(after).await {
                    error!("Failed to requeue stale tasks: {}", e);
                }
            }

            match self.poll_once().await {
                Ok(started) => {
                    if started > 0 {
                        info!("Started {} task(s) this cycle", started);
                    }
                }
                Err(e) => error!("Error during poll cycle: {}", e),
            }
        }
    }

    /// Claims tasks while execution slots are free and spawns them
    pub async fn poll_once(&self) -> Result<usize> {
        let mut started = 0;

        loop {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                debug!("All execution slots busy");
                break;
            };

            let Some(task) = self.queue.claim(&self.config.worker_id).await? else {
                debug!("No tasks available");
                break;
            };

            let queue = Arc::clone(&self.queue);
            let channel = Arc::clone(&self.channel);
            let completion = self.completion.clone();

            tokio::spawn(async move {
                let task_id = task.description.id;
                if let Err(e) = process(task, queue, channel, completion).await {
                    error!("Task {} failed: {}", task_id, e);
                }
                drop(permit);
            });
            started += 1;
        }

        Ok(started)
    }
}

/// Executes one claimed task end to end and records its delivery state
///
/// A transport error leaves the run PENDING and the task FAILURE.
pub async fn process(
    task: Task,
    queue: Arc<dyn TaskQueue>,
    channel: Arc<dyn RemoteChannel>,
    completion: CompletionHandler,
) -> Result<Completion> {
    let description = task.description;
    info!(
        "Executing task {} for run {}",
        description.id, description.run_id
    );

    let outcome = match executor::execute(channel, description.command.clone()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(
                "Transport failure for task {} (run {} stays PENDING): {}",
                description.id, description.run_id, e
            );
            queue
                .finish(description.id, TaskState::Failure, Some(&e.to_string()))
                .await?;
            return Err(EngineError::Transport(e));
        }
    };

    match completion.complete(&description, outcome).await {
        Ok(result) => {
            queue.finish(description.id, TaskState::Success, None).await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(finish_err) = queue
                .finish(description.id, TaskState::Failure, Some(&e.to_string()))
                .await
            {
                warn!(
                    "Failed to record failure of task {}: {}",
                    description.id, finish_err
                );
            }
            Err(e)
        }
    }
}
