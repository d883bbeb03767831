pub mod generation;
pub mod health;
pub mod workers;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /generate                       submit a generation request (POST)
/// /tasks/{task_id}                latest progress record
/// /tasks/{task_id}/progress       all progress records
/// /progress/ws?task_id=…          progress WebSocket
///
/// /workers                        registered workers
/// /workers/ws                     worker WebSocket
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(generation::router())
        .merge(workers::router())
}
