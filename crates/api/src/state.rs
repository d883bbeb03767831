use std::sync::Arc;

use vidgen_core::dispatch::WorkerGroup;
use vidgen_events::ProgressStream;

use crate::config::ServerConfig;
use crate::ws::WorkerRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything lives behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Where accepted requests go: the registry in remote mode, an
    /// in-process group in local mode.
    pub dispatcher: Arc<dyn WorkerGroup>,
    /// Connected worker sockets.
    pub registry: Arc<WorkerRegistry>,
    /// The progress topic every task publishes to.
    pub progress: Arc<ProgressStream>,
}
