//! Request intake.
//!
//! A request is fully validated (task category, model lookup, modality
//! inputs, numeric ranges) before the worker group sees it. Only then does
//! the gateway settle the task id and trigger the group. The trigger returns
//! as soon as the group accepted the job; the caller follows the outcome
//! through the returned [`TaskHandle`].

use std::sync::Arc;

use vidgen_core::dispatch::{DispatchAck, WorkerGroup};
use vidgen_core::error::CoreError;
use vidgen_core::resolver::validate;
use vidgen_core::task::GenerationRequest;
use vidgen_core::types::TaskId;
use vidgen_events::{ProgressStream, TaskHandle};

/// An accepted request.
#[derive(Debug)]
pub struct Submission {
    pub ack: DispatchAck,
    pub handle: TaskHandle,
}

/// Validate `request` and hand it to `dispatcher`.
///
/// A caller-supplied `task_id` is kept; a missing one is generated. Nothing
/// is published and nothing is dispatched when validation fails.
pub async fn submit(
    dispatcher: &dyn WorkerGroup,
    progress: &Arc<ProgressStream>,
    mut request: GenerationRequest,
) -> Result<Submission, CoreError> {
    validate(&request)?;

    if dispatcher.ranks_available() == 0 {
        return Err(CoreError::Unavailable("no workers connected".into()));
    }

    let task_id = request.task_id.clone().unwrap_or_else(TaskId::generate);
    request.task_id = Some(task_id.clone());
    let task = request.task.clone();

    let ack = dispatcher.trigger(request).await?;
    tracing::info!(task_id = %task_id, task = %task, ack = ack.as_str(), "Task dispatched");

    Ok(Submission {
        ack,
        handle: TaskHandle::new(task_id, Arc::clone(progress)),
    })
}
