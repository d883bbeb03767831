//! Rendezvous configuration.
//!
//! # Environment variables
//!
//! | Variable                 | Default     | Description                              |
//! |--------------------------|-------------|------------------------------------------|
//! | `RANK`                   | `0`         | Rank of this process                     |
//! | `WORLD_SIZE`             | `1`         | Number of ranks in the job               |
//! | `LOCAL_RANK`             | `0`         | Rank on this host; selects the device    |
//! | `MASTER_ADDR`            | `127.0.0.1` | Address rank 0 listens on                |
//! | `MASTER_PORT`            | `29500`     | Port rank 0 listens on                   |
//! | `DIST_JOIN_TIMEOUT_SECS` | `600`       | How long to wait for every rank to join  |
//! | `NCCL_SOCKET_IFNAME`     | unset       | Network interface hint for the model     |
//! | `NCCL_IB_DISABLE`        | unset       | InfiniBand toggle for the model          |

use std::time::Duration;

use crate::error::CollectiveError;

pub const DEFAULT_MASTER_ADDR: &str = "127.0.0.1";
pub const DEFAULT_MASTER_PORT: u16 = 29500;
pub const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 600;

/// Where and how this process joins its collective group.
///
/// Built once at process start and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedConfig {
    pub rank: u32,
    pub world_size: u32,
    pub local_rank: u32,
    pub master_addr: String,
    pub master_port: u16,
    pub join_timeout: Duration,
    /// Forwarded to the model process as `NCCL_SOCKET_IFNAME`.
    pub socket_ifname: Option<String>,
    /// Forwarded to the model process as `NCCL_IB_DISABLE`.
    pub ib_disable: Option<String>,
}

impl DistributedConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, CollectiveError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CollectiveError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            rank: parse_var(&lookup, "RANK")?.unwrap_or(0),
            world_size: parse_var(&lookup, "WORLD_SIZE")?.unwrap_or(1),
            local_rank: parse_var(&lookup, "LOCAL_RANK")?.unwrap_or(0),
            master_addr: lookup("MASTER_ADDR")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_MASTER_ADDR.to_string()),
            master_port: parse_var(&lookup, "MASTER_PORT")?.unwrap_or(DEFAULT_MASTER_PORT),
            join_timeout: Duration::from_secs(
                parse_var(&lookup, "DIST_JOIN_TIMEOUT_SECS")?.unwrap_or(DEFAULT_JOIN_TIMEOUT_SECS),
            ),
            socket_ifname: lookup("NCCL_SOCKET_IFNAME"),
            ib_disable: lookup("NCCL_IB_DISABLE"),
        };
        config.validate()?;
        Ok(config)
    }

    /// A single-rank configuration.
    pub fn single() -> Self {
        Self::for_rank(0, 1)
    }

    /// Rank `rank` of a `world_size` job on this host with default rendezvous.
    pub fn for_rank(rank: u32, world_size: u32) -> Self {
        Self {
            rank,
            world_size,
            local_rank: rank,
            master_addr: DEFAULT_MASTER_ADDR.to_string(),
            master_port: DEFAULT_MASTER_PORT,
            join_timeout: Duration::from_secs(DEFAULT_JOIN_TIMEOUT_SECS),
            socket_ifname: None,
            ib_disable: None,
        }
    }

    pub fn validate(&self) -> Result<(), CollectiveError> {
        if self.world_size == 0 {
            return Err(CollectiveError::InvalidConfig(
                "WORLD_SIZE must be >= 1".into(),
            ));
        }
        if self.rank >= self.world_size {
            return Err(CollectiveError::InvalidConfig(format!(
                "RANK {} >= WORLD_SIZE {}",
                self.rank, self.world_size
            )));
        }
        if self.world_size > 1 && self.join_timeout.is_zero() {
            return Err(CollectiveError::InvalidConfig(
                "DIST_JOIN_TIMEOUT_SECS must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Accelerator ordinal this rank is bound to.
    pub fn device_index(&self) -> u32 {
        self.local_rank
    }

    pub fn master_socket_addr(&self) -> String {
        format!("{}:{}", self.master_addr, self.master_port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, CollectiveError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            CollectiveError::InvalidConfig(format!("{key} must be a non-negative integer, got '{raw}'"))
        }),
    }
}
