//! Run API Handlers
//!
//! Submission of analyses and visualizations, and everything a client polls
//! afterwards.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use butler_core::domain::run::{OwnerKind, Run, RunKind};
use butler_core::dto::run::{RunFile, RunStatus, SubmitRun};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /analyses
pub async fn submit_analysis(
    State(state): State<AppState>,
    Json(req): Json<SubmitRun>,
) -> ApiResult<impl IntoResponse> {
    submit(state, RunKind::Analysis, req).await
}

/// POST /visualizations
pub async fn submit_visualization(
    State(state): State<AppState>,
    Json(req): Json<SubmitRun>,
) -> ApiResult<impl IntoResponse> {
    submit(state, RunKind::Visualization, req).await
}

/// Accepted: the run body plus where to poll its task
async fn submit(state: AppState, kind: RunKind, req: SubmitRun) -> ApiResult<impl IntoResponse> {
    tracing::info!("Submitting {} of '{}'", kind, req.definition_uid);

    let submission = state.runs.submit(kind, req).await?;
    let location = format!("/taskstatus/{}", submission.task_id);

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, location)],
        Json(submission.run),
    ))
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_kind: String,
    pub owner_id: i64,
}

/// GET /runs?owner_kind=user&owner_id=1
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> ApiResult<Json<Vec<Run>>> {
    let owner_kind = OwnerKind::parse(&query.owner_kind).ok_or_else(|| {
        ApiError::BadRequest(format!("Unknown owner kind '{}'", query.owner_kind))
    })?;

    Ok(Json(state.runs.list_for_owner(owner_kind, query.owner_id).await?))
}

/// GET /runs/{id}
pub async fn get_run(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);
    Ok(Json(state.runs.get(id).await?))
}

/// GET /runs/{id}/status
pub async fn get_run_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<RunStatus>> {
    Ok(Json(state.runs.status(id).await?))
}

/// GET /runs/{id}/input_files
pub async fn get_input_files(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<RunFile>>> {
    Ok(Json(state.runs.input_files(id).await?))
}

/// GET /runs/{id}/output_files
pub async fn get_output_files(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<RunFile>>> {
    Ok(Json(state.runs.output_files(id).await?))
}

/// DELETE /runs/{id}
pub async fn delete_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting run: {}", id);
    state.runs.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
