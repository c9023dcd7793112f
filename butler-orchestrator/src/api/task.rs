//! Task API Handlers

use axum::{
    Json,
    extract::{Path, State},
};
use butler_core::dto::task::TaskStatus;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::state::AppState;

/// GET /taskstatus/{id}
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskStatus>> {
    let task = state.queue.status(id).await?;

    Ok(Json(TaskStatus {
        task_id: task.description.id,
        state: task.state,
        error_message: task.error_message,
    }))
}
