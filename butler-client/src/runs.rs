//! Run submission and lookup endpoints

use butler_core::domain::run::{OwnerKind, Run, RunKind};
use butler_core::dto::run::{RunFile, RunStatus, Submission, SubmitRun};
use reqwest::header::LOCATION;

use crate::error::{ClientError, Result};
use crate::{ButlerClient, task_id_from_location};

impl ButlerClient {
    // =============================================================================
    // Submission
    // =============================================================================

    /// Submit a pipeline run
    ///
    /// Request errors (unknown pipeline, missing parameter, unknown input
    /// file) come back as 4xx API errors; nothing is queued in that case.
    pub async fn submit_analysis(&self, req: &SubmitRun) -> Result<Submission> {
        self.submit(RunKind::Analysis, req).await
    }

    /// Submit a plot run
    pub async fn submit_visualization(&self, req: &SubmitRun) -> Result<Submission> {
        self.submit(RunKind::Visualization, req).await
    }

    async fn submit(&self, kind: RunKind, req: &SubmitRun) -> Result<Submission> {
        let path = match kind {
            RunKind::Analysis => "analyses",
            RunKind::Visualization => "visualizations",
        };
        let url = format!("{}/{}", self.base_url, path);
        let response = self.client.post(&url).json(req).send().await?;
        let response = Self::check_status(response).await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ClientError::ParseError("Missing Location header".to_string()))?;
        let task_id = task_id_from_location(&location).ok_or_else(|| {
            ClientError::ParseError(format!("Unexpected Location header '{}'", location))
        })?;

        let run: Run = response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))?;

        Ok(Submission { run, task_id })
    }

    // =============================================================================
    // Runs
    // =============================================================================

    pub async fn get_run(&self, run_id: i64) -> Result<Run> {
        let url = format!("{}/runs/{}", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn run_status(&self, run_id: i64) -> Result<RunStatus> {
        let url = format!("{}/runs/{}/status", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Runs of one owner, newest first
    pub async fn list_runs(&self, owner_kind: OwnerKind, owner_id: i64) -> Result<Vec<Run>> {
        let url = format!("{}/runs", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("owner_kind", owner_kind.as_str().to_string()),
                ("owner_id", owner_id.to_string()),
            ])
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn input_files(&self, run_id: i64) -> Result<Vec<RunFile>> {
        let url = format!("{}/runs/{}/input_files", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Catalogued outputs; empty until the run succeeds
    pub async fn output_files(&self, run_id: i64) -> Result<Vec<RunFile>> {
        let url = format!("{}/runs/{}/output_files", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    pub async fn delete_run(&self, run_id: i64) -> Result<()> {
        let url = format!("{}/runs/{}", self.base_url, run_id);
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }
}
