use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use vidgen_core::task::GenerationRequest;

use crate::error::WorkerError;
use crate::generation::RankWorker;

/// How long the closing barrier waits for peers on shutdown.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Run queued requests one at a time on this rank.
///
/// Job failures are already reported by [`RankWorker::run_task`]; only a
/// broken collective group stops the loop, because the rank can no longer
/// stay in step with its peers.
pub async fn run(
    worker: RankWorker,
    mut tasks: mpsc::UnboundedReceiver<GenerationRequest>,
) -> Result<(), WorkerError> {
    let rank = worker.dist().rank();
    tracing::info!(rank, "Task executor started");

    while let Some(request) = tasks.recv().await {
        match worker.run_task(request).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                tracing::error!(rank, error = %e, "Collective group broken, executor stopping");
                return Err(e);
            }
            Err(e) => {
                tracing::debug!(rank, error = %e, "Task ended with error");
            }
        }
    }

    tracing::info!(rank, "Task queue closed, executor stopping");
    Ok(())
}

/// Run queued requests until `shutdown` resolves or the queue closes, then
/// leave the group. A broken group is not torn down; its peers are gone.
pub async fn run_until<F>(
    worker: RankWorker,
    tasks: mpsc::UnboundedReceiver<GenerationRequest>,
    shutdown: F,
) -> Result<(), WorkerError>
where
    F: Future<Output = ()>,
{
    let dist = worker.dist().clone();
    let rank = dist.rank();

    tokio::select! {
        result = run(worker, tasks) => result?,
        () = shutdown => tracing::info!(rank, "Shutdown requested"),
    }

    match tokio::time::timeout(TEARDOWN_TIMEOUT, dist.teardown()).await {
        Ok(result) => result.map_err(WorkerError::from),
        Err(_) => {
            tracing::warn!(rank, "Peers did not reach the closing barrier, leaving anyway");
            Ok(())
        }
    }
}
