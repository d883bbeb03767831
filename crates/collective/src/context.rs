use std::sync::Arc;

use crate::config::DistributedConfig;
use crate::error::CollectiveError;
use crate::group::Collective;
use crate::local::LocalGroup;
use crate::tcp::TcpGroup;

/// A worker's membership in its collective group.
///
/// One instance per worker process (or per in-process rank). Rank 0 is the
/// coordinator: it owns seed generation, the final artifact and terminal
/// progress reporting.
#[derive(Clone)]
pub struct DistributedContext {
    config: DistributedConfig,
    group: Arc<dyn Collective>,
}

impl DistributedContext {
    /// Join the group described by `config`.
    ///
    /// A world size of one never touches the network.
    pub async fn join(config: DistributedConfig) -> Result<Self, CollectiveError> {
        config.validate()?;
        let group: Arc<dyn Collective> = if config.world_size > 1 {
            tracing::info!(
                rank = config.rank,
                world_size = config.world_size,
                device = config.device_index(),
                "Joining collective group",
            );
            Arc::new(TcpGroup::join(&config).await?)
        } else {
            Arc::new(LocalGroup::solo())
        };
        Ok(Self { config, group })
    }

    /// Wrap an existing group, e.g. one rank of a [`LocalGroup`].
    pub fn with_group(config: DistributedConfig, group: Arc<dyn Collective>) -> Self {
        Self { config, group }
    }

    pub fn rank(&self) -> u32 {
        self.config.rank
    }

    pub fn world_size(&self) -> u32 {
        self.config.world_size
    }

    pub fn local_rank(&self) -> u32 {
        self.config.local_rank
    }

    pub fn device_index(&self) -> u32 {
        self.config.device_index()
    }

    pub fn is_coordinator(&self) -> bool {
        self.config.rank == 0
    }

    pub fn config(&self) -> &DistributedConfig {
        &self.config
    }

    /// Agree on the job seed: rank 0's `seed` is broadcast and every rank
    /// returns it.
    pub async fn agree_seed(&self, seed: u64) -> Result<u64, CollectiveError> {
        let agreed = self.group.broadcast_u64(seed).await?;
        tracing::debug!(rank = self.rank(), seed = agreed, "Seed agreed");
        Ok(agreed)
    }

    /// Block until every rank reaches this point.
    pub async fn barrier(&self) -> Result<(), CollectiveError> {
        self.group.barrier().await
    }

    /// Final barrier, then release the group.
    pub async fn teardown(self) -> Result<(), CollectiveError> {
        self.group.barrier().await?;
        self.group.shutdown().await?;
        tracing::info!(rank = self.rank(), "Left collective group");
        Ok(())
    }
}

impl std::fmt::Debug for DistributedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedContext")
            .field("rank", &self.config.rank)
            .field("world_size", &self.config.world_size)
            .field("local_rank", &self.config.local_rank)
            .finish()
    }
}
