//! Domain types shared by the gateway and the worker processes.
//!
//! - [`task`] parses a raw [`GenerationRequest`](task::GenerationRequest) into
//!   a typed [`GenerationTask`](task::GenerationTask).
//! - [`model_config`] holds the fixed table of supported checkpoints.
//! - [`resolver`] fills sampling defaults and draws seeds.
//! - [`progress`] defines the records published on the progress stream.
//! - [`protocol`] is the gateway/worker WebSocket envelope.
//! - [`dispatch`] is the seam between the gateway and a worker group.

pub mod dispatch;
pub mod error;
pub mod model_config;
pub mod progress;
pub mod protocol;
pub mod resolver;
pub mod task;
pub mod types;
