//! Collective group membership for the ranks of one distributed job.
//!
//! - [`DistributedConfig`] is the rendezvous record, read once at startup.
//! - [`Collective`] is the operation set every group provides: a fixed-width
//!   broadcast from rank 0 and a barrier.
//! - [`TcpGroup`] joins ranks in separate processes over a TCP star rooted
//!   at rank 0; [`LocalGroup`] joins ranks living in the same process.
//! - [`DistributedContext`] is what a worker holds for its lifetime.

pub mod config;
pub mod context;
pub mod error;
pub mod group;
pub mod local;
pub mod tcp;

pub use config::DistributedConfig;
pub use context::DistributedContext;
pub use error::CollectiveError;
pub use group::Collective;
pub use local::LocalGroup;
pub use tcp::TcpGroup;
