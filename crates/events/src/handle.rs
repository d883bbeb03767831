use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use vidgen_core::progress::ProgressRecord;
use vidgen_core::types::TaskId;

use crate::stream::ProgressStream;

/// Returned by a dispatch: the task id plus access to its progress.
#[derive(Clone)]
pub struct TaskHandle {
    task_id: TaskId,
    stream: Arc<ProgressStream>,
}

impl TaskHandle {
    pub fn new(task_id: TaskId, stream: Arc<ProgressStream>) -> Self {
        Self { task_id, stream }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Records published so far, in emission order.
    pub fn poll(&self) -> Vec<ProgressRecord> {
        self.stream.records_for(&self.task_id)
    }

    pub fn latest(&self) -> Option<ProgressRecord> {
        self.stream.latest_for(&self.task_id)
    }

    pub fn subscribe(&self) -> TaskSubscription {
        self.stream.subscribe_task(&self.task_id)
    }

    /// Wait up to `timeout` for the task's COMPLETED or FAILED record.
    pub async fn wait_for_terminal(&self, timeout: Duration) -> Option<ProgressRecord> {
        let mut subscription = self.subscribe();
        tokio::time::timeout(timeout, async {
            while let Some(record) = subscription.next().await {
                if record.status.is_terminal() {
                    return Some(record);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task_id", &self.task_id)
            .finish()
    }
}

/// Ordered stream of one task's records: replayed backlog, then live.
///
/// Ends after the first terminal record.
pub struct TaskSubscription {
    task_id: TaskId,
    backlog: VecDeque<ProgressRecord>,
    receiver: broadcast::Receiver<ProgressRecord>,
    finished: bool,
}

impl TaskSubscription {
    pub(crate) fn new(
        task_id: TaskId,
        backlog: VecDeque<ProgressRecord>,
        receiver: broadcast::Receiver<ProgressRecord>,
    ) -> Self {
        Self {
            task_id,
            backlog,
            receiver,
            finished: false,
        }
    }

    pub async fn next(&mut self) -> Option<ProgressRecord> {
        if self.finished {
            return None;
        }
        let record = match self.backlog.pop_front() {
            Some(record) => record,
            None => self.next_live().await?,
        };
        self.finished = record.status.is_terminal();
        Some(record)
    }

    async fn next_live(&mut self) -> Option<ProgressRecord> {
        loop {
            match self.receiver.recv().await {
                Ok(record) if record.task_id == self.task_id => return Some(record),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(task_id = %self.task_id, skipped, "Progress subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
