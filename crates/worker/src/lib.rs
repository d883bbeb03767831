//! `vidgen-worker` library crate.
//!
//! Re-exports the worker modules for the gateway (which can host a worker
//! group in-process) and for integration tests. The binary entrypoint lives
//! in `main.rs`.

pub mod config;
pub mod error;
pub mod executor;
pub mod generation;
pub mod launcher;
pub mod local;
pub mod session;

pub use config::WorkerConfig;
pub use error::WorkerError;
pub use generation::{GenerationResult, RankWorker};
pub use local::LocalWorkerGroup;
