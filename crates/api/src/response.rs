//! Response envelope types shared by handlers.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Body of an accepted generation request.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// `task_queued` or `task_started`.
    pub status: &'static str,
    pub task_id: String,
}
