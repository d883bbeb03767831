use async_trait::async_trait;

use crate::error::CollectiveError;

/// Operations every rank of a group must call in the same order.
///
/// Each call returns only after all ranks made the matching call.
#[async_trait]
pub trait Collective: Send + Sync {
    fn rank(&self) -> u32;

    fn world_size(&self) -> u32;

    /// Send `value` from rank 0 to every rank. Non-zero ranks ignore their
    /// own argument and return the value rank 0 sent.
    async fn broadcast_u64(&self, value: u64) -> Result<u64, CollectiveError>;

    async fn barrier(&self) -> Result<(), CollectiveError>;

    /// Release the group's transport, if it has one. The TCP group closes
    /// its links so later collectives fail; the in-process group holds
    /// nothing to release.
    async fn shutdown(&self) -> Result<(), CollectiveError> {
        Ok(())
    }
}
