use std::time::Duration;

/// Coordination failures. Every variant is fatal to the job that hit it.
#[derive(Debug, thiserror::Error)]
pub enum CollectiveError {
    #[error("Invalid distributed configuration: {0}")]
    InvalidConfig(String),

    /// Not all ranks arrived before the join timeout.
    #[error("Rendezvous timed out after {timeout:?}: {joined} of {world_size} ranks present")]
    RendezvousTimeout {
        joined: u32,
        world_size: u32,
        timeout: Duration,
    },

    #[error("I/O error during {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Collective protocol violation: {0}")]
    Protocol(String),

    #[error("Rank {rank} disconnected from the collective group")]
    PeerDisconnected { rank: u32 },
}
