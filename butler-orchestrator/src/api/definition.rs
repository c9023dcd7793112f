//! Definition API Handlers
//!
//! Read-only views of the pipeline and plot catalogs.

use axum::{
    Json,
    extract::{Path, State},
};
use butler_core::domain::definition::{Definition, DefinitionKind};
use butler_core::dto::definition::DefinitionFile;

use crate::api::error::ApiResult;
use crate::state::AppState;

/// GET /pipelines
pub async fn list_pipelines(State(state): State<AppState>) -> ApiResult<Json<Vec<DefinitionFile>>> {
    tracing::debug!("Listing pipelines");
    Ok(Json(state.definitions.list(DefinitionKind::Pipeline).await?))
}

/// GET /pipelines/{uid}
/// Loads the pipeline, refreshing its catalog record if the file changed
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Json<Definition>> {
    tracing::debug!("Getting pipeline: {}", uid);
    Ok(Json(state.definitions.load(DefinitionKind::Pipeline, &uid).await?))
}

/// GET /plots
pub async fn list_plots(State(state): State<AppState>) -> ApiResult<Json<Vec<DefinitionFile>>> {
    tracing::debug!("Listing plots");
    Ok(Json(state.definitions.list(DefinitionKind::Plot).await?))
}

/// GET /plots/{uid}
pub async fn get_plot(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Json<Definition>> {
    tracing::debug!("Getting plot: {}", uid);
    Ok(Json(state.definitions.load(DefinitionKind::Plot, &uid).await?))
}
