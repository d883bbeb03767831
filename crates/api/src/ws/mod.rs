//! WebSocket infrastructure: the worker registry, the worker and progress
//! socket handlers, and the heartbeat.

mod heartbeat;
mod progress_socket;
pub mod registry;
mod worker_socket;

pub use heartbeat::start_heartbeat;
pub use progress_socket::{progress_ws_handler, ProgressQuery};
pub use registry::{WorkerInfo, WorkerRegistry, WorkerSummary};
pub use worker_socket::worker_ws_handler;
