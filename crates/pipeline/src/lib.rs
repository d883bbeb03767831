//! Turn a resolved task into a model invocation and run it.
//!
//! - [`plan`] maps each task variant onto its pipeline variant and the
//!   keyword arguments that variant takes. It does no numerical work.
//! - [`ModelRunner`] is the seam in front of the external model;
//!   [`SubprocessRunner`] is the production implementation.

pub mod error;
pub mod plan;
pub mod runner;
pub mod subprocess;

pub use error::GenerationError;
pub use plan::{plan, PipelineInvocation, PipelineVariant};
pub use runner::{GeneratedVideo, ModelRunner};
pub use subprocess::SubprocessRunner;
