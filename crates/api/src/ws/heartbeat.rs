use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ws::registry::WorkerRegistry;

/// Interval between heartbeat pings (in seconds).
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Spawn a background task that pings every worker socket until `cancel`
/// fires.
pub fn start_heartbeat(registry: Arc<WorkerRegistry>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Heartbeat stopping");
                    break;
                }
                _ = interval.tick() => {
                    let count = registry.connection_count().await;
                    tracing::debug!(count, "Worker heartbeat ping");
                    registry.ping_all().await;
                }
            }
        }
    })
}
