use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use vidgen_core::dispatch::{DispatchAck, WorkerGroup};
use vidgen_core::error::CoreError;
use vidgen_core::protocol::GatewayMessage;
use vidgen_core::task::GenerationRequest;
use vidgen_core::types::Timestamp;

/// Channel sender half for pushing messages to a worker socket.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// What a worker said about itself in its `register` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub rank: u32,
    pub world_size: u32,
    pub worker_name: String,
    pub observer: bool,
}

/// One connected worker socket.
pub struct WorkerConnection {
    /// `None` until the worker registers.
    pub info: Option<WorkerInfo>,
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

impl WorkerConnection {
    /// Registered, not an observer, and still reachable.
    fn takes_work(&self) -> bool {
        matches!(&self.info, Some(info) if !info.observer) && !self.sender.is_closed()
    }
}

/// Listing entry for `GET /api/v1/workers`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub conn_id: String,
    #[serde(flatten)]
    pub info: WorkerInfo,
    pub connected_at: Timestamp,
}

/// All worker sockets connected to this gateway.
///
/// Every registered task worker is treated as a replica: a trigger is sent
/// to all of them and each rank of a group receives the same request.
pub struct WorkerRegistry {
    connections: RwLock<HashMap<String, WorkerConnection>>,
    /// Registered non-observer workers; kept beside the map so
    /// `ranks_available` does not need the async lock.
    task_workers: AtomicUsize,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            task_workers: AtomicUsize::new(0),
        }
    }

    /// Track a new socket. Returns the receiver the socket's sender task
    /// drains.
    pub async fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WorkerConnection {
            info: None,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Attach registration details to a socket. A repeated `register`
    /// replaces the earlier details.
    pub async fn register(&self, conn_id: &str, info: WorkerInfo) -> bool {
        let mut conns = self.connections.write().await;
        let Some(conn) = conns.get_mut(conn_id) else {
            return false;
        };
        let was_worker = conn.info.as_ref().is_some_and(|i| !i.observer);
        let is_worker = !info.observer;
        conn.info = Some(info);
        match (was_worker, is_worker) {
            (false, true) => {
                self.task_workers.fetch_add(1, Ordering::SeqCst);
            }
            (true, false) => {
                self.task_workers.fetch_sub(1, Ordering::SeqCst);
            }
            _ => {}
        }
        true
    }

    pub async fn remove(&self, conn_id: &str) {
        let removed = self.connections.write().await.remove(conn_id);
        if removed.is_some_and(|c| c.info.is_some_and(|i| !i.observer)) {
            self.task_workers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Registered workers ordered by rank, then name.
    pub async fn list(&self) -> Vec<WorkerSummary> {
        let mut workers: Vec<WorkerSummary> = self
            .connections
            .read()
            .await
            .iter()
            .filter_map(|(id, conn)| {
                conn.info.clone().map(|info| WorkerSummary {
                    conn_id: id.clone(),
                    info,
                    connected_at: conn.connected_at,
                })
            })
            .collect();
        workers.sort_by(|a, b| {
            (a.info.rank, &a.info.worker_name).cmp(&(b.info.rank, &b.info.worker_name))
        });
        workers
    }

    /// Send `message` to every task worker. Returns how many received it.
    pub async fn broadcast(&self, message: Message) -> usize {
        let conns = self.connections.read().await;
        conns
            .values()
            .filter(|c| c.takes_work())
            .filter(|c| c.sender.send(message.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        self.task_workers.store(0, Ordering::SeqCst);
        tracing::info!(count, "Closed all worker connections");
    }

    /// Send a Ping frame to every connection.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerGroup for WorkerRegistry {
    async fn trigger(&self, request: GenerationRequest) -> Result<DispatchAck, CoreError> {
        let task_id = request.task_id.clone();
        let text = serde_json::to_string(&GatewayMessage::Generate { request })
            .map_err(|e| CoreError::Internal(format!("encoding generate message: {e}")))?;

        let delivered = self.broadcast(Message::Text(text.into())).await;
        if delivered == 0 {
            return Err(CoreError::Unavailable("no workers connected".into()));
        }
        tracing::debug!(task_id = ?task_id, delivered, "Generate message broadcast");
        Ok(DispatchAck::Queued)
    }

    fn ranks_available(&self) -> usize {
        self.task_workers.load(Ordering::SeqCst)
    }
}
