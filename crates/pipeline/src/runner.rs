use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vidgen_collective::DistributedConfig;

use crate::error::GenerationError;
use crate::plan::PipelineInvocation;

/// Video produced by the model on rank 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedVideo {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<u32>,
}

/// Progress callback; receives a percentage in `0..=100`.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// The external model call.
///
/// Every rank of a job calls `run` with its own invocation. The call blocks
/// for the whole generation; only rank 0 is expected to return a video.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &PipelineInvocation,
        dist: &DistributedConfig,
        on_progress: ProgressFn<'_>,
    ) -> Result<Option<GeneratedVideo>, GenerationError>;
}
