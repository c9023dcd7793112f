//! Task status endpoint

use butler_core::dto::task::TaskStatus;
use uuid::Uuid;

use crate::ButlerClient;
use crate::error::Result;

impl ButlerClient {
    /// Delivery state of a queued task
    ///
    /// A task in `SUCCESS` only means the worker finished with it; the run
    /// state tells whether the pipeline itself succeeded.
    pub async fn task_status(&self, task_id: Uuid) -> Result<TaskStatus> {
        let url = format!("{}/taskstatus/{}", self.base_url, task_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
