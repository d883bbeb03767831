//! In-process collective group for ranks running as tasks of one runtime.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Barrier, Mutex};

use crate::error::CollectiveError;
use crate::group::Collective;

/// Ranks only ever have one broadcast in flight, so a small buffer suffices.
const BROADCAST_CAPACITY: usize = 16;

/// One rank's handle on an in-process group.
pub struct LocalGroup {
    rank: u32,
    world_size: u32,
    sender: broadcast::Sender<u64>,
    /// `None` on rank 0, which only sends.
    receiver: Option<Mutex<broadcast::Receiver<u64>>>,
    barrier: Arc<Barrier>,
}

impl LocalGroup {
    /// Create handles for every rank of a `world_size` group, ordered by rank.
    ///
    /// Receivers are subscribed up front so no broadcast can be missed.
    pub fn create(world_size: u32) -> Vec<LocalGroup> {
        let world_size = world_size.max(1);
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        let barrier = Arc::new(Barrier::new(world_size as usize));

        (0..world_size)
            .map(|rank| LocalGroup {
                rank,
                world_size,
                receiver: (rank != 0).then(|| Mutex::new(sender.subscribe())),
                sender: sender.clone(),
                barrier: Arc::clone(&barrier),
            })
            .collect()
    }

    /// A group of one; every collective returns immediately.
    pub fn solo() -> LocalGroup {
        let (sender, _) = broadcast::channel(1);
        LocalGroup {
            rank: 0,
            world_size: 1,
            sender,
            receiver: None,
            barrier: Arc::new(Barrier::new(1)),
        }
    }
}

#[async_trait]
impl Collective for LocalGroup {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn world_size(&self) -> u32 {
        self.world_size
    }

    async fn broadcast_u64(&self, value: u64) -> Result<u64, CollectiveError> {
        match &self.receiver {
            None => {
                if self.world_size > 1 && self.sender.send(value).is_err() {
                    return Err(CollectiveError::PeerDisconnected { rank: 1 });
                }
                Ok(value)
            }
            Some(receiver) => {
                let mut receiver = receiver.lock().await;
                match receiver.recv().await {
                    Ok(value) => Ok(value),
                    Err(broadcast::error::RecvError::Closed) => {
                        Err(CollectiveError::PeerDisconnected { rank: 0 })
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => Err(CollectiveError::Protocol(
                        format!("rank {} missed {n} broadcasts", self.rank),
                    )),
                }
            }
        }
    }

    async fn barrier(&self) -> Result<(), CollectiveError> {
        self.barrier.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_rank_adopts_rank_zero_value() {
        let handles: Vec<_> = LocalGroup::create(4)
            .into_iter()
            .map(|group| {
                tokio::spawn(async move {
                    let own = 7 + u64::from(group.rank());
                    let agreed = group.broadcast_u64(own).await.unwrap();
                    group.barrier().await.unwrap();
                    agreed
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 7);
        }
    }

    #[tokio::test]
    async fn solo_group_is_immediate() {
        let group = LocalGroup::solo();
        assert_eq!(group.broadcast_u64(42).await.unwrap(), 42);
        group.barrier().await.unwrap();
        assert_eq!(group.world_size(), 1);
    }
}
