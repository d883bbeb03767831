use axum::extract::State;
use axum::Json;

use crate::response::DataResponse;
use crate::state::AppState;
use crate::ws::WorkerSummary;

/// GET /api/v1/workers -- registered worker sockets, ordered by rank.
pub async fn list_workers(State(state): State<AppState>) -> Json<DataResponse<Vec<WorkerSummary>>> {
    Json(DataResponse {
        data: state.registry.list().await,
    })
}
