//! A worker group whose ranks all live in the current process.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use vidgen_collective::{DistributedConfig, DistributedContext, LocalGroup};
use vidgen_core::dispatch::{DispatchAck, WorkerGroup};
use vidgen_core::error::CoreError;
use vidgen_core::task::GenerationRequest;
use vidgen_events::ProgressReporter;
use vidgen_pipeline::ModelRunner;
use vidgen_storage::ArtifactStore;

use crate::executor;
use crate::generation::RankWorker;

/// `world_size` ranks joined by an in-process [`LocalGroup`], each with its
/// own task queue and executor.
pub struct LocalWorkerGroup {
    queues: Vec<mpsc::UnboundedSender<GenerationRequest>>,
}

impl LocalWorkerGroup {
    /// Spawn one executor task per rank. Must be called inside a Tokio
    /// runtime.
    pub fn spawn(
        world_size: u32,
        runner: Arc<dyn ModelRunner>,
        store: Arc<dyn ArtifactStore>,
        reporter: Arc<dyn ProgressReporter>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let output_dir = output_dir.into();
        let world_size = world_size.max(1);

        let queues = LocalGroup::create(world_size)
            .into_iter()
            .enumerate()
            .map(|(rank, group)| {
                let dist = DistributedContext::with_group(
                    DistributedConfig::for_rank(rank as u32, world_size),
                    Arc::new(group),
                );
                let worker = RankWorker::new(
                    dist,
                    Arc::clone(&runner),
                    Arc::clone(&store),
                    Arc::clone(&reporter),
                    output_dir.clone(),
                );
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(executor::run(worker, rx));
                tx
            })
            .collect();

        tracing::info!(world_size, "Local worker group started");
        Self { queues }
    }
}

#[async_trait]
impl WorkerGroup for LocalWorkerGroup {
    async fn trigger(&self, request: GenerationRequest) -> Result<DispatchAck, CoreError> {
        // A request that reaches only some ranks would stall the rest at
        // the seed broadcast, so check every queue first.
        if let Some(rank) = self.queues.iter().position(|q| q.is_closed()) {
            return Err(CoreError::Unavailable(format!("local rank {rank} has stopped")));
        }
        for (rank, queue) in self.queues.iter().enumerate() {
            queue
                .send(request.clone())
                .map_err(|_| CoreError::Unavailable(format!("local rank {rank} has stopped")))?;
        }
        Ok(DispatchAck::Started)
    }

    fn ranks_available(&self) -> usize {
        self.queues.iter().filter(|q| !q.is_closed()).count()
    }
}
