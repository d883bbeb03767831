//! Multi-process collective group over TCP.
//!
//! The topology is a star: rank 0 listens on `MASTER_ADDR:MASTER_PORT`,
//! every other rank connects to it. Rendezvous uses a fixed handshake:
//!
//! ```text
//! peer  -> rank 0 : magic u32 | rank u32 | world_size u32
//! rank 0 -> peer  : magic u32
//! ```
//!
//! After the handshake every collective is a sequence of 9-byte frames
//! (`op u8 | payload u64`, big-endian). Because all ranks issue collectives
//! in the same order, frames on each link never interleave.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout_at, Duration, Instant};

use crate::config::DistributedConfig;
use crate::error::CollectiveError;
use crate::group::Collective;

const HELLO_MAGIC: u32 = 0x5647_4331;

const OP_BROADCAST: u8 = 1;
const OP_BARRIER: u8 = 2;
const OP_RELEASE: u8 = 3;

/// Delay between connection attempts while rank 0 is not yet listening.
const CONNECT_RETRY: Duration = Duration::from_millis(200);

/// How long rank 0 waits for an accepted connection's handshake before
/// dropping it and accepting the next one.
const HELLO_TIMEOUT: Duration = Duration::from_secs(2);

enum Role {
    /// Rank 0 holds one stream per peer, ordered by peer rank.
    Coordinator { peers: Mutex<Vec<TcpStream>> },
    Peer { stream: Mutex<TcpStream> },
}

/// A collective group whose ranks live in separate processes.
pub struct TcpGroup {
    rank: u32,
    world_size: u32,
    role: Role,
}

impl std::fmt::Debug for TcpGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = match self.role {
            Role::Coordinator { .. } => "coordinator",
            Role::Peer { .. } => "peer",
        };
        f.debug_struct("TcpGroup")
            .field("rank", &self.rank)
            .field("world_size", &self.world_size)
            .field("role", &role)
            .finish()
    }
}

impl TcpGroup {
    /// Join the group described by `config`.
    ///
    /// Blocks until every rank has joined. Fails with
    /// [`CollectiveError::RendezvousTimeout`] when the join timeout elapses
    /// first.
    pub async fn join(config: &DistributedConfig) -> Result<Self, CollectiveError> {
        config.validate()?;
        let deadline = Instant::now() + config.join_timeout;

        let role = if config.rank == 0 {
            accept_peers(config, deadline).await?
        } else {
            connect_to_master(config, deadline).await?
        };

        tracing::info!(
            rank = config.rank,
            world_size = config.world_size,
            master = %config.master_socket_addr(),
            "Joined collective group",
        );

        Ok(Self {
            rank: config.rank,
            world_size: config.world_size,
            role,
        })
    }
}

#[async_trait]
impl Collective for TcpGroup {
    fn rank(&self) -> u32 {
        self.rank
    }

    fn world_size(&self) -> u32 {
        self.world_size
    }

    async fn broadcast_u64(&self, value: u64) -> Result<u64, CollectiveError> {
        match &self.role {
            Role::Coordinator { peers } => {
                let mut peers = peers.lock().await;
                for (peer_rank, stream) in ranked(&mut peers) {
                    write_frame(stream, OP_BROADCAST, value)
                        .await
                        .map_err(|e| link_error(peer_rank, e))?;
                }
                Ok(value)
            }
            Role::Peer { stream } => {
                let mut stream = stream.lock().await;
                let (op, payload) = read_frame(&mut stream).await.map_err(|e| link_error(0, e))?;
                expect_op(op, OP_BROADCAST)?;
                Ok(payload)
            }
        }
    }

    async fn barrier(&self) -> Result<(), CollectiveError> {
        match &self.role {
            Role::Coordinator { peers } => {
                let mut peers = peers.lock().await;
                for (peer_rank, stream) in ranked(&mut peers) {
                    let (op, _) = read_frame(stream).await.map_err(|e| link_error(peer_rank, e))?;
                    expect_op(op, OP_BARRIER)?;
                }
                for (peer_rank, stream) in ranked(&mut peers) {
                    write_frame(stream, OP_RELEASE, 0)
                        .await
                        .map_err(|e| link_error(peer_rank, e))?;
                }
                Ok(())
            }
            Role::Peer { stream } => {
                let mut stream = stream.lock().await;
                write_frame(&mut stream, OP_BARRIER, 0)
                    .await
                    .map_err(|e| link_error(0, e))?;
                let (op, _) = read_frame(&mut stream).await.map_err(|e| link_error(0, e))?;
                expect_op(op, OP_RELEASE)
            }
        }
    }

    async fn shutdown(&self) -> Result<(), CollectiveError> {
        match &self.role {
            Role::Coordinator { peers } => {
                for stream in peers.lock().await.iter_mut() {
                    let _ = stream.shutdown().await;
                }
            }
            Role::Peer { stream } => {
                let _ = stream.lock().await.shutdown().await;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rendezvous
// ---------------------------------------------------------------------------

async fn accept_peers(config: &DistributedConfig, deadline: Instant) -> Result<Role, CollectiveError> {
    let addr = config.master_socket_addr();
    let listener = TcpListener::bind(&addr).await.map_err(|source| CollectiveError::Io {
        context: format!("binding rendezvous address {addr}"),
        source,
    })?;

    let expected = (config.world_size - 1) as usize;
    let mut slots: Vec<Option<TcpStream>> = (0..expected).map(|_| None).collect();
    let mut joined = 0usize;

    while joined < expected {
        let timed_out = || CollectiveError::RendezvousTimeout {
            joined: joined as u32 + 1,
            world_size: config.world_size,
            timeout: config.join_timeout,
        };

        let (mut stream, peer_addr) = match timeout_at(deadline, listener.accept()).await {
            Err(_) => return Err(timed_out()),
            Ok(Err(source)) => {
                return Err(CollectiveError::Io {
                    context: "accepting peer".into(),
                    source,
                })
            }
            Ok(Ok(pair)) => pair,
        };

        // A silent connection such as a port scan must not hold
        // up the ranks queued behind it.
        let hello_deadline = (Instant::now() + HELLO_TIMEOUT).min(deadline);
        let (peer_rank, peer_world) = match timeout_at(hello_deadline, read_hello(&mut stream)).await {
            Err(_) if Instant::now() >= deadline => return Err(timed_out()),
            Err(_) => {
                tracing::warn!(%peer_addr, "Dropped connection that sent no handshake");
                continue;
            }
            Ok(Err(e)) => {
                tracing::warn!(%peer_addr, error = %e, "Rejected peer during rendezvous");
                continue;
            }
            Ok(Ok(hello)) => hello,
        };

        if peer_world != config.world_size
            || peer_rank == 0
            || peer_rank >= config.world_size
            || slots[(peer_rank - 1) as usize].is_some()
        {
            tracing::warn!(
                %peer_addr,
                peer_rank,
                peer_world,
                "Rejected peer with conflicting rank or world size",
            );
            continue;
        }

        if let Err(e) = stream.write_u32(HELLO_MAGIC).await {
            tracing::warn!(%peer_addr, peer_rank, error = %e, "Failed to acknowledge peer");
            continue;
        }
        let _ = stream.set_nodelay(true);

        slots[(peer_rank - 1) as usize] = Some(stream);
        joined += 1;
        tracing::debug!(peer_rank, joined, expected, "Peer joined collective group");
    }

    let peers = slots.into_iter().flatten().collect();
    Ok(Role::Coordinator {
        peers: Mutex::new(peers),
    })
}

async fn connect_to_master(config: &DistributedConfig, deadline: Instant) -> Result<Role, CollectiveError> {
    let addr = config.master_socket_addr();
    let timed_out = || CollectiveError::RendezvousTimeout {
        joined: 1,
        world_size: config.world_size,
        timeout: config.join_timeout,
    };

    let mut stream = loop {
        match timeout_at(deadline, TcpStream::connect(&addr)).await {
            Err(_) => return Err(timed_out()),
            Ok(Ok(stream)) => break stream,
            Ok(Err(e)) => {
                tracing::debug!(rank = config.rank, %addr, error = %e, "Rank 0 not reachable yet");
                if Instant::now() + CONNECT_RETRY >= deadline {
                    return Err(timed_out());
                }
                sleep(CONNECT_RETRY).await;
            }
        }
    };
    let _ = stream.set_nodelay(true);

    let handshake = async {
        stream.write_u32(HELLO_MAGIC).await?;
        stream.write_u32(config.rank).await?;
        stream.write_u32(config.world_size).await?;
        stream.read_u32().await
    };
    let ack = match timeout_at(deadline, handshake).await {
        Err(_) => return Err(timed_out()),
        Ok(Err(source)) => {
            return Err(CollectiveError::Io {
                context: format!("handshake with rank 0 at {addr}"),
                source,
            })
        }
        Ok(Ok(ack)) => ack,
    };
    if ack != HELLO_MAGIC {
        return Err(CollectiveError::Protocol(format!(
            "unexpected handshake acknowledgement {ack:#x}"
        )));
    }

    Ok(Role::Peer {
        stream: Mutex::new(stream),
    })
}

async fn read_hello(stream: &mut TcpStream) -> Result<(u32, u32), CollectiveError> {
    let io_err = |source| CollectiveError::Io {
        context: "reading peer handshake".into(),
        source,
    };
    let magic = stream.read_u32().await.map_err(io_err)?;
    if magic != HELLO_MAGIC {
        return Err(CollectiveError::Protocol(format!("bad handshake magic {magic:#x}")));
    }
    let rank = stream.read_u32().await.map_err(io_err)?;
    let world_size = stream.read_u32().await.map_err(io_err)?;
    Ok((rank, world_size))
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

fn ranked(peers: &mut [TcpStream]) -> impl Iterator<Item = (u32, &mut TcpStream)> {
    peers
        .iter_mut()
        .enumerate()
        .map(|(i, stream)| (i as u32 + 1, stream))
}

async fn write_frame(stream: &mut TcpStream, op: u8, payload: u64) -> io::Result<()> {
    let mut frame = [0u8; 9];
    frame[0] = op;
    frame[1..].copy_from_slice(&payload.to_be_bytes());
    stream.write_all(&frame).await
}

async fn read_frame(stream: &mut TcpStream) -> io::Result<(u8, u64)> {
    let mut frame = [0u8; 9];
    stream.read_exact(&mut frame).await?;
    let mut payload = [0u8; 8];
    payload.copy_from_slice(&frame[1..]);
    Ok((frame[0], u64::from_be_bytes(payload)))
}

fn expect_op(actual: u8, expected: u8) -> Result<(), CollectiveError> {
    if actual == expected {
        Ok(())
    } else {
        Err(CollectiveError::Protocol(format!(
            "expected frame op {expected}, got {actual}"
        )))
    }
}

fn link_error(rank: u32, source: io::Error) -> CollectiveError {
    match source.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => CollectiveError::PeerDisconnected { rank },
        _ => CollectiveError::Io {
            context: format!("collective link with rank {rank}"),
            source,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
