//! Runner configuration
//!
//! Worker-side settings: identity, polling cadence, parallelism and stale
//! task redelivery. Catalog, layout and channel settings come from the
//! engine's own configuration.

use std::time::Duration;

use butler_engine::scheduler::PollerConfig;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// How often to poll the task queue
    pub poll_interval: Duration,

    /// Max tasks executing at once
    pub max_parallel_tasks: usize,

    /// Requeue tasks whose worker went silent for this long
    pub redelivery_after: Option<Duration>,
}

impl RunnerConfig {
    /// Creates a new configuration with defaults
    pub fn new(runner_id: String) -> Self {
        Self {
            runner_id,
            poll_interval: Duration::from_secs(2),
            max_parallel_tasks: 4,
            redelivery_after: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - RUNNER_ID (required)
    /// - POLL_INTERVAL (optional, seconds, default: 2)
    /// - MAX_PARALLEL_TASKS (optional, default: 4)
    /// - TASK_REDELIVERY_AFTER (optional, seconds, disabled when unset)
    pub fn from_env() -> anyhow::Result<Self> {
        let runner_id = std::env::var("RUNNER_ID")
            .map_err(|_| anyhow::anyhow!("RUNNER_ID environment variable not set"))?;

        let poll_interval = std::env::var("POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(2));

        let max_parallel_tasks = std::env::var("MAX_PARALLEL_TASKS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(4);

        let redelivery_after = std::env::var("TASK_REDELIVERY_AFTER")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        Ok(Self {
            runner_id,
            poll_interval,
            max_parallel_tasks,
            redelivery_after,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.max_parallel_tasks == 0 {
            anyhow::bail!("max_parallel_tasks must be greater than 0");
        }

        if self.redelivery_after.is_some_and(|d| d.is_zero()) {
            anyhow::bail!("redelivery_after must be greater than 0 when set");
        }

        Ok(())
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            worker_id: self.runner_id.clone(),
            poll_interval: self.poll_interval,
            max_parallel_tasks: self.max_parallel_tasks,
            redelivery_after: self.redelivery_after,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}
