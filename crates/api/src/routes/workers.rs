use axum::routing::get;
use axum::Router;

use crate::handlers::workers;
use crate::state::AppState;
use crate::ws;

/// ```text
/// GET /workers
/// GET /workers/ws
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workers", get(workers::list_workers))
        .route("/workers/ws", get(ws::worker_ws_handler))
}
