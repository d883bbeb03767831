use std::sync::Arc;

use tokio::sync::mpsc;
use vidgen_core::progress::ProgressRecord;

/// Sink for progress records.
///
/// Implementations must return promptly and swallow their own failures:
/// reporting is best-effort and must never fail a generation job.
pub trait ProgressReporter: Send + Sync {
    fn publish(&self, record: ProgressRecord);
}

impl<R: ProgressReporter + ?Sized> ProgressReporter for Arc<R> {
    fn publish(&self, record: ProgressRecord) {
        (**self).publish(record)
    }
}

// ---------------------------------------------------------------------------
// DisabledReporter
// ---------------------------------------------------------------------------

/// Drops every record.
///
/// Selected when no message channel is configured or the channel could not
/// be opened at startup, and for every rank other than 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledReporter;

impl ProgressReporter for DisabledReporter {
    fn publish(&self, _record: ProgressRecord) {}
}

// ---------------------------------------------------------------------------
// ChannelReporter
// ---------------------------------------------------------------------------

/// Forwards records into an unbounded channel, converting them into the
/// channel's message type (e.g. the worker's outbound WebSocket envelope).
pub struct ChannelReporter<T> {
    sender: mpsc::UnboundedSender<T>,
}

impl<T> ChannelReporter<T> {
    pub fn new(sender: mpsc::UnboundedSender<T>) -> Self {
        Self { sender }
    }
}

impl<T> ProgressReporter for ChannelReporter<T>
where
    T: From<ProgressRecord> + Send,
{
    fn publish(&self, record: ProgressRecord) {
        // The receiver only goes away when the worker is shutting down.
        if self.sender.send(T::from(record)).is_err() {
            tracing::debug!("Progress channel closed, record dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// TracingReporter
// ---------------------------------------------------------------------------

/// Logs each record as a structured event. Used by one-shot CLI runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn publish(&self, record: ProgressRecord) {
        tracing::info!(
            task_id = %record.task_id,
            status = ?record.status,
            progress = record.progress,
            url = record.url.as_deref(),
            error = record.error.as_deref(),
            "Progress",
        );
    }
}

#[cfg(test)]
mod tests {
    use vidgen_core::progress::ProgressStatus;
    use vidgen_core::types::TaskId;

    use super::*;

    #[test]
    fn disabled_reporter_is_idempotent() {
        let reporter = DisabledReporter;
        for _ in 0..10_000 {
            reporter.publish(ProgressRecord::new(TaskId::from("t"), ProgressStatus::Started));
        }
    }

    #[tokio::test]
    async fn channel_reporter_converts_records() {
        #[derive(Debug)]
        struct Envelope(ProgressRecord);
        impl From<ProgressRecord> for Envelope {
            fn from(record: ProgressRecord) -> Self {
                Envelope(record)
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let reporter = ChannelReporter::new(tx);
        reporter.publish(ProgressRecord::failed(TaskId::from("t-9"), "boom"));

        let Envelope(record) = rx.recv().await.unwrap();
        assert_eq!(record.status, ProgressStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn channel_reporter_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel::<ProgressRecord>();
        drop(rx);
        let reporter = ChannelReporter::new(tx);
        reporter.publish(ProgressRecord::new(TaskId::from("t"), ProgressStatus::Started));
    }
}
