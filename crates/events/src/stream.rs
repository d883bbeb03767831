//! The gateway's in-process progress stream.
//!
//! [`ProgressStream`] is an append-only log of [`ProgressRecord`]s under a
//! fixed topic name, combined with a `tokio::sync::broadcast` fan-out for
//! live subscribers. It is shared via `Arc<ProgressStream>`.

use std::collections::VecDeque;
use std::sync::RwLock;

use tokio::sync::broadcast;
use vidgen_core::progress::{ProgressRecord, PROGRESS_TOPIC};
use vidgen_core::types::TaskId;

use crate::handle::TaskSubscription;
use crate::reporter::ProgressReporter;

/// Default number of records kept for polling.
pub const DEFAULT_RETENTION: usize = 65_536;

/// Default buffer capacity for the live broadcast channel.
pub const DEFAULT_CAPACITY: usize = 1024;

pub struct ProgressStream {
    log: RwLock<VecDeque<ProgressRecord>>,
    retention: usize,
    sender: broadcast::Sender<ProgressRecord>,
}

impl ProgressStream {
    /// Create a stream keeping at most `retention` records for polling.
    ///
    /// Once full, the oldest records are evicted. Live subscribers that fall
    /// more than `capacity` records behind observe `RecvError::Lagged`.
    pub fn new(retention: usize, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            log: RwLock::new(VecDeque::new()),
            retention: retention.max(1),
            sender,
        }
    }

    pub fn topic(&self) -> &'static str {
        PROGRESS_TOPIC
    }

    /// Append a record and fan it out to live subscribers.
    pub fn append(&self, record: ProgressRecord) {
        let mut log = self.log.write().unwrap_or_else(|e| e.into_inner());
        if log.len() == self.retention {
            log.pop_front();
        }
        log.push_back(record.clone());
        // Sent while the log lock is held so subscribers that snapshot the
        // log under the same lock neither miss nor duplicate a record.
        let _ = self.sender.send(record);
    }

    /// All retained records for `task_id`, in emission order.
    pub fn records_for(&self, task_id: &TaskId) -> Vec<ProgressRecord> {
        let log = self.log.read().unwrap_or_else(|e| e.into_inner());
        log.iter()
            .filter(|r| &r.task_id == task_id)
            .cloned()
            .collect()
    }

    /// Most recent record for `task_id`.
    pub fn latest_for(&self, task_id: &TaskId) -> Option<ProgressRecord> {
        let log = self.log.read().unwrap_or_else(|e| e.into_inner());
        log.iter().rev().find(|r| &r.task_id == task_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.log.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to every record appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressRecord> {
        self.sender.subscribe()
    }

    /// Subscribe to one task: already-retained records are replayed first,
    /// then live ones follow until a terminal record.
    pub fn subscribe_task(&self, task_id: &TaskId) -> TaskSubscription {
        let log = self.log.read().unwrap_or_else(|e| e.into_inner());
        let receiver = self.sender.subscribe();
        let backlog = log
            .iter()
            .filter(|r| &r.task_id == task_id)
            .cloned()
            .collect();
        TaskSubscription::new(task_id.clone(), backlog, receiver)
    }
}

impl Default for ProgressStream {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_CAPACITY)
    }
}

impl ProgressReporter for ProgressStream {
    fn publish(&self, record: ProgressRecord) {
        tracing::debug!(
            task_id = %record.task_id,
            status = ?record.status,
            topic = PROGRESS_TOPIC,
            "Progress record appended",
        );
        self.append(record);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use vidgen_core::progress::ProgressStatus;

    use super::*;

    fn record(task: &str, status: ProgressStatus) -> ProgressRecord {
        ProgressRecord::new(TaskId::from(task), status)
    }

    #[test]
    fn records_are_kept_in_emission_order_per_task() {
        let stream = ProgressStream::default();
        stream.publish(record("a", ProgressStatus::Started));
        stream.publish(record("b", ProgressStatus::Started));
        stream.publish(record("a", ProgressStatus::LoadingModel));
        stream.publish(record("a", ProgressStatus::Completed));

        let statuses: Vec<_> = stream
            .records_for(&TaskId::from("a"))
            .into_iter()
            .map(|r| r.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                ProgressStatus::Started,
                ProgressStatus::LoadingModel,
                ProgressStatus::Completed
            ]
        );
        assert_eq!(
            stream.latest_for(&TaskId::from("b")).map(|r| r.status),
            Some(ProgressStatus::Started)
        );
        assert_eq!(stream.topic(), "wan22-progress-stream");
    }

    #[test]
    fn retention_evicts_oldest() {
        let stream = ProgressStream::new(2, 8);
        stream.publish(record("a", ProgressStatus::Started));
        stream.publish(record("b", ProgressStatus::Started));
        stream.publish(record("c", ProgressStatus::Started));
        assert_eq!(stream.len(), 2);
        assert!(stream.records_for(&TaskId::from("a")).is_empty());
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_fail() {
        let stream = ProgressStream::default();
        stream.publish(record("a", ProgressStatus::Started));
        let mut rx = stream.subscribe();
        stream.publish(record("a", ProgressStatus::Failed));
        assert_eq!(rx.recv().await.unwrap().status, ProgressStatus::Failed);
    }
}
