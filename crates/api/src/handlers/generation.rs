//! Handlers for generation intake and progress polling.
//!
//! Routes:
//! - `POST /generate`                   -- validate and dispatch a request
//! - `GET  /tasks/{task_id}`            -- latest record for a task
//! - `GET  /tasks/{task_id}/progress`   -- every record for a task

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use vidgen_core::error::CoreError;
use vidgen_core::task::GenerationRequest;
use vidgen_core::types::TaskId;

use crate::error::{AppError, AppResult};
use crate::gateway;
use crate::response::{DataResponse, SubmitResponse};
use crate::state::AppState;

/// POST /api/v1/generate
///
/// Answers 202 as soon as the worker group accepted the job; the job's
/// outcome is only visible through progress records.
pub async fn submit_generation(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let submission = gateway::submit(state.dispatcher.as_ref(), &state.progress, request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            status: submission.ack.as_str(),
            task_id: submission.handle.task_id().to_string(),
        }),
    ))
}

/// GET /api/v1/tasks/{task_id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let record = state
        .progress
        .latest_for(&TaskId::from(task_id.as_str()))
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Task",
            id: task_id,
        }))?;

    Ok(Json(DataResponse { data: record }))
}

/// GET /api/v1/tasks/{task_id}/progress
///
/// Records in emission order. A queued task that no worker picked up yet
/// has no records, so an empty list is not an error.
pub async fn get_task_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<DataResponse<Vec<vidgen_core::progress::ProgressRecord>>> {
    Json(DataResponse {
        data: state.progress.records_for(&TaskId::from(task_id)),
    })
}
