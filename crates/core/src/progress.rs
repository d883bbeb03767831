//! Progress records published on the task progress stream.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{TaskId, Timestamp};

/// Fixed name of the stream every progress record is appended to.
pub const PROGRESS_TOPIC: &str = "wan22-progress-stream";

/// Lifecycle status of a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    Started,
    LoadingModel,
    GeneratingVideo,
    SavingLocally,
    Completed,
    Failed,
}

impl ProgressStatus {
    /// `true` for the statuses that end a task's stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One record on the progress stream.
///
/// Status-specific payload fields are omitted from the JSON when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub task_id: TaskId,
    pub status: ProgressStatus,
    /// Percentage in `0..=100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

impl ProgressRecord {
    pub fn new(task_id: TaskId, status: ProgressStatus) -> Self {
        Self {
            task_id,
            status,
            progress: None,
            url: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Terminal success record carrying the artifact location.
    pub fn completed(task_id: TaskId, url: impl Into<String>) -> Self {
        Self::new(task_id, ProgressStatus::Completed)
            .with_progress(100)
            .with_url(url)
    }

    /// Terminal failure record carrying the error text.
    pub fn failed(task_id: TaskId, error: impl Into<String>) -> Self {
        Self::new(task_id, ProgressStatus::Failed).with_error(error)
    }

    /// Set the percentage, clamped to 100.
    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent.min(100));
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_value(ProgressStatus::GeneratingVideo).unwrap();
        assert_eq!(json, "GENERATING_VIDEO");
        assert!(ProgressStatus::Failed.is_terminal());
        assert!(!ProgressStatus::SavingLocally.is_terminal());
    }

    #[test]
    fn unset_payload_fields_are_omitted() {
        let record = ProgressRecord::new(TaskId::from("t-1"), ProgressStatus::Started);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["task_id"], "t-1");
        assert_eq!(json["status"], "STARTED");
        assert!(json.get("url").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("progress").is_none());
    }

    #[test]
    fn completed_record_carries_url_and_full_progress() {
        let record = ProgressRecord::completed(TaskId::from("t-2"), "s3://bucket/videos/a.mp4");
        assert_eq!(record.status, ProgressStatus::Completed);
        assert_eq!(record.progress, Some(100));
        assert_eq!(record.url.as_deref(), Some("s3://bucket/videos/a.mp4"));
    }

    #[test]
    fn progress_is_clamped() {
        let record = ProgressRecord::new(TaskId::from("t"), ProgressStatus::GeneratingVideo)
            .with_progress(250);
        assert_eq!(record.progress, Some(100));
    }
}
