use vidgen_collective::CollectiveError;
use vidgen_core::error::CoreError;
use vidgen_pipeline::GenerationError;

/// Why a generation job on this rank did not complete.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid worker configuration: {0}")]
    Config(String),

    /// The request was rejected before any coordination took place.
    #[error(transparent)]
    Task(#[from] CoreError),

    /// The collective group broke; the group cannot run further jobs.
    #[error("Coordination failed: {0}")]
    Coordination(#[from] CollectiveError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
}

impl WorkerError {
    /// `true` when this rank can no longer take part in collectives.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Coordination(_))
    }
}
