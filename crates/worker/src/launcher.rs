//! Single-host multi-process launch.
//!
//! With `LAUNCH_LOCAL_RANKS=true`, rank 0 re-executes the current binary
//! once for each of ranks `1..WORLD_SIZE`, passing the same arguments and
//! the standard rendezvous variables. The children join rank 0's group like
//! any remote rank would.

use tokio::process::{Child, Command};
use vidgen_collective::DistributedConfig;

/// Spawn ranks `1..world_size` on this host.
///
/// The children are killed when their handles are dropped.
pub fn spawn_local_ranks(config: &DistributedConfig) -> std::io::Result<Vec<Child>> {
    let current_exe = std::env::current_exe()?;
    let args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();

    let mut children = Vec::with_capacity(config.world_size.saturating_sub(1) as usize);
    for rank in 1..config.world_size {
        tracing::info!(rank, world_size = config.world_size, "Spawning local rank");

        let child = Command::new(&current_exe)
            .args(&args)
            .env("RANK", rank.to_string())
            .env("WORLD_SIZE", config.world_size.to_string())
            // Single host: the local rank is the global rank.
            .env("LOCAL_RANK", rank.to_string())
            .env("MASTER_ADDR", &config.master_addr)
            .env("MASTER_PORT", config.master_port.to_string())
            .env("DIST_JOIN_TIMEOUT_SECS", config.join_timeout.as_secs().to_string())
            .env("LAUNCH_LOCAL_RANKS", "false")
            .kill_on_drop(true)
            .spawn()?;

        children.push(child);
    }
    Ok(children)
}
