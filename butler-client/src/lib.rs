//! Butler HTTP Client
//!
//! A typed client for the Butler orchestrator API: browse pipeline and plot
//! definitions, submit runs, and poll runs and tasks until they settle.
//!
//! # Example
//!
//! ```no_run
//! use butler_client::ButlerClient;
//! use butler_core::domain::run::{Owner, Parameter};
//! use butler_core::dto::run::SubmitRun;
//!
//! # async fn example() -> butler_client::Result<()> {
//! let client = ButlerClient::new("http://localhost:8080");
//!
//! let submission = client
//!     .submit_analysis(&SubmitRun {
//!         owner: Owner::user(1, "alice"),
//!         definition_uid: "align".to_string(),
//!         parameters: vec![Parameter::new("reads", "12")],
//!     })
//!     .await?;
//!
//! let status = client.task_status(submission.task_id).await?;
//! println!("Run {} task is {:?}", submission.run.id, status.state);
//! # Ok(())
//! # }
//! ```

pub mod error;
mod definitions;
mod runs;
mod tasks;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// HTTP client for the Butler orchestrator API
#[derive(Debug, Clone)]
pub struct ButlerClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl ButlerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client around a configured reqwest Client (timeouts, proxies, TLS)
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /health
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }
}

/// Extracts the task id from a `Location: /taskstatus/{id}` header value
pub(crate) fn task_id_from_location(location: &str) -> Option<Uuid> {
    let (prefix, id) = location.trim_end_matches('/').rsplit_once('/')?;
    if !prefix.ends_with("taskstatus") {
        return None;
    }
    Uuid::parse_str(id).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ButlerClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ButlerClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_task_id_from_location() {
        let id = Uuid::new_v4();
        assert_eq!(
            task_id_from_location(&format!("/taskstatus/{}", id)),
            Some(id)
        );
        assert_eq!(
            task_id_from_location(&format!("http://butler:8080/taskstatus/{}", id)),
            Some(id)
        );
        assert_eq!(task_id_from_location(&format!("/runs/{}", id)), None);
        assert_eq!(task_id_from_location("/taskstatus/not-a-uuid"), None);
    }
}
