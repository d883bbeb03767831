use axum::routing::{get, post};
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;
use crate::ws;

/// ```text
/// POST /generate
/// GET  /tasks/{task_id}
/// GET  /tasks/{task_id}/progress
/// GET  /progress/ws
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate", post(generation::submit_generation))
        .route("/tasks/{task_id}", get(generation::get_task))
        .route("/tasks/{task_id}/progress", get(generation::get_task_progress))
        .route("/progress/ws", get(ws::progress_ws_handler))
}
