//! The per-rank generation job.
//!
//! Every rank of a group runs [`RankWorker::run_task`] for every request.
//! Only rank 0 publishes progress and hands off the artifact; the other
//! ranks take part in the seed broadcast, the model call and the closing
//! barrier.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Instrument;
use vidgen_collective::DistributedContext;
use vidgen_core::progress::{ProgressRecord, ProgressStatus};
use vidgen_core::resolver::resolve;
use vidgen_core::task::GenerationRequest;
use vidgen_core::types::TaskId;
use vidgen_events::{DisabledReporter, ProgressReporter};
use vidgen_pipeline::{plan, GeneratedVideo, GenerationError, ModelRunner};
use vidgen_storage::{upload_or_local, ArtifactStore, UploadTarget};

use crate::error::WorkerError;

/// Outcome of a job, produced on rank 0 only.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub task_id: TaskId,
    pub video: GeneratedVideo,
    /// Name of the model configuration used.
    pub model: &'static str,
    pub seed: u64,
    /// Remote URL, or the local path when the upload did not happen.
    pub url: String,
}

/// Everything one rank needs to run generation jobs.
pub struct RankWorker {
    dist: DistributedContext,
    runner: Arc<dyn ModelRunner>,
    store: Arc<dyn ArtifactStore>,
    reporter: Arc<dyn ProgressReporter>,
    output_dir: PathBuf,
}

impl RankWorker {
    /// `reporter` is only used on rank 0; other ranks never publish.
    pub fn new(
        dist: DistributedContext,
        runner: Arc<dyn ModelRunner>,
        store: Arc<dyn ArtifactStore>,
        reporter: Arc<dyn ProgressReporter>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let reporter: Arc<dyn ProgressReporter> = if dist.is_coordinator() {
            reporter
        } else {
            Arc::new(DisabledReporter)
        };
        Self {
            dist,
            runner,
            store,
            reporter,
            output_dir: output_dir.into(),
        }
    }

    pub fn dist(&self) -> &DistributedContext {
        &self.dist
    }

    /// Run one job on this rank.
    ///
    /// Returns `Ok(Some(_))` on rank 0 when the video was produced and
    /// handed off, `Ok(None)` on every other rank.
    pub async fn run_task(&self, request: GenerationRequest) -> Result<Option<GenerationResult>, WorkerError> {
        let task_id = request.task_id.clone().unwrap_or_else(TaskId::generate);
        let span = tracing::info_span!("task", task_id = %task_id, rank = self.dist.rank());
        self.run_task_inner(task_id, request).instrument(span).await
    }

    async fn run_task_inner(
        &self,
        task_id: TaskId,
        request: GenerationRequest,
    ) -> Result<Option<GenerationResult>, WorkerError> {
        let reporter = &self.reporter;
        reporter.publish(ProgressRecord::new(task_id.clone(), ProgressStatus::Started));

        // Configuration errors stop the job before any collective call.
        let resolved = resolve(&request).map_err(|e| self.fail(&task_id, e.into()))?;

        let seed = self
            .dist
            .agree_seed(resolved.seed)
            .await
            .map_err(|e| self.fail(&task_id, e.into()))?;
        let resolved = resolved.with_seed(seed);

        let invocation = plan(&task_id, &resolved, self.dist.config(), &self.output_dir);
        tracing::info!(
            model = resolved.model.name,
            variant = ?invocation.variant,
            seed,
            steps = resolved.sample_steps,
            frames = resolved.frame_num,
            "Generation planned",
        );

        reporter.publish(ProgressRecord::new(task_id.clone(), ProgressStatus::LoadingModel));
        reporter.publish(ProgressRecord::new(task_id.clone(), ProgressStatus::GeneratingVideo));

        let on_progress = |percent: u8| {
            reporter.publish(
                ProgressRecord::new(task_id.clone(), ProgressStatus::GeneratingVideo)
                    .with_progress(percent),
            );
        };
        let outcome = self
            .runner
            .run(&invocation, self.dist.config(), &on_progress)
            .await;

        // Every rank reaches the barrier, whatever the model call returned.
        let synced = self.dist.barrier().await;

        let video = match (outcome, synced) {
            (Err(e), _) => return Err(self.fail(&task_id, e.into())),
            (Ok(_), Err(e)) => return Err(self.fail(&task_id, e.into())),
            (Ok(video), Ok(())) => video,
        };

        if !self.dist.is_coordinator() {
            return Ok(None);
        }

        let video = video.ok_or_else(|| self.fail(&task_id, GenerationError::MissingOutput.into()))?;

        reporter.publish(ProgressRecord::new(task_id.clone(), ProgressStatus::SavingLocally));
        if !tokio::fs::try_exists(&video.path).await.unwrap_or(false) {
            let missing = GenerationError::OutputNotFound(video.path.display().to_string());
            return Err(self.fail(&task_id, missing.into()));
        }

        let target = UploadTarget {
            bucket: resolved.output.s3_bucket.clone(),
            key_prefix: resolved.output.s3_key_prefix.clone(),
        };
        let url = upload_or_local(self.store.as_ref(), &video.path, &target).await;

        reporter.publish(ProgressRecord::completed(task_id.clone(), url.clone()));
        tracing::info!(url = %url, "Generation completed");

        Ok(Some(GenerationResult {
            task_id,
            video,
            model: resolved.model.name,
            seed,
            url,
        }))
    }

    /// Log `error` and publish the task's single FAILED record.
    fn fail(&self, task_id: &TaskId, error: WorkerError) -> WorkerError {
        tracing::error!(error = %error, "Generation failed");
        self.reporter
            .publish(ProgressRecord::failed(task_id.clone(), error.to_string()));
        error
    }
}
