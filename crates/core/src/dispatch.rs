//! The gateway's view of a worker group.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;
use crate::task::GenerationRequest;

/// Acknowledgement returned once a worker group accepted a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchAck {
    /// The request was handed to remote workers; they pick it up in order.
    #[serde(rename = "task_queued")]
    Queued,
    /// An in-process rank began (or queued locally) the job.
    #[serde(rename = "task_started")]
    Started,
}

impl DispatchAck {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "task_queued",
            Self::Started => "task_started",
        }
    }
}

/// Something that can run a generation job across all of its ranks.
///
/// `trigger` must return as soon as the job is accepted, never after it
/// finishes. Outcomes are reported on the progress stream.
#[async_trait]
pub trait WorkerGroup: Send + Sync {
    /// Hand `request` (with its `task_id` already assigned) to every rank.
    async fn trigger(&self, request: GenerationRequest) -> Result<DispatchAck, CoreError>;

    /// Number of ranks currently able to take work.
    fn ranks_available(&self) -> usize;
}
