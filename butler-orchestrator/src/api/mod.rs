//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod definition;
pub mod error;
pub mod health;
pub mod run;
pub mod task;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Definition catalogs
        .route("/pipelines", get(definition::list_pipelines))
        .route("/pipelines/{uid}", get(definition::get_pipeline))
        .route("/plots", get(definition::list_plots))
        .route("/plots/{uid}", get(definition::get_plot))
        // Submission
        .route("/analyses", post(run::submit_analysis))
        .route("/visualizations", post(run::submit_visualization))
        // Runs
        .route("/runs", get(run::list_runs))
        .route("/runs/{id}", get(run::get_run).delete(run::delete_run))
        .route("/runs/{id}/status", get(run::get_run_status))
        .route("/runs/{id}/input_files", get(run::get_input_files))
        .route("/runs/{id}/output_files", get(run::get_output_files))
        // Tasks
        .route("/taskstatus/{id}", get(task::get_task_status))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
