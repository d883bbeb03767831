//! Progress reporting.
//!
//! - [`ProgressReporter`] is the publish side every generation job writes to.
//!   Publishing never blocks and never fails the job.
//! - [`DisabledReporter`] is the no-op used when no channel is available.
//! - [`ProgressStream`] is the gateway's in-process append-only stream with
//!   live fan-out to subscribers.
//! - [`TaskHandle`] is what a caller gets back from a dispatch: the task id
//!   plus poll/subscribe access to its records.

pub mod handle;
pub mod reporter;
pub mod stream;

pub use handle::{TaskHandle, TaskSubscription};
pub use reporter::{ChannelReporter, DisabledReporter, ProgressReporter, TracingReporter};
pub use stream::ProgressStream;
