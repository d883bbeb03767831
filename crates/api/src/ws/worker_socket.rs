use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use vidgen_core::protocol::WorkerMessage;
use vidgen_events::ProgressStream;

use crate::state::AppState;
use crate::ws::registry::{WorkerInfo, WorkerRegistry};

/// GET /api/v1/workers/ws -- a worker rank's connection to the gateway.
///
/// Workers send `register` once, then `progress` records; the gateway sends
/// `generate` messages down the same socket.
pub async fn worker_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_worker_socket(socket, state.registry, state.progress))
}

async fn handle_worker_socket(socket: WebSocket, registry: Arc<WorkerRegistry>, progress: Arc<ProgressStream>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "Worker socket connected");

    let mut rx = registry.add(conn_id.clone()).await;
    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Worker socket sink closed");
                break;
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => handle_worker_message(&conn_id, text.as_str(), &registry, &progress).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Worker socket receive error");
                break;
            }
        }
    }

    registry.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "Worker socket disconnected");
}

async fn handle_worker_message(conn_id: &str, text: &str, registry: &WorkerRegistry, progress: &ProgressStream) {
    let message: WorkerMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(conn_id, error = %e, "Ignoring malformed worker message");
            return;
        }
    };

    match message {
        WorkerMessage::Register {
            rank,
            world_size,
            worker_name,
            observer,
        } => {
            tracing::info!(conn_id, rank, world_size, worker_name = %worker_name, observer, "Worker registered");
            registry
                .register(
                    conn_id,
                    WorkerInfo {
                        rank,
                        world_size,
                        worker_name,
                        observer,
                    },
                )
                .await;
        }
        WorkerMessage::Progress { record } => {
            tracing::debug!(conn_id, task_id = %record.task_id, status = ?record.status, "Worker progress");
            progress.append(record);
        }
    }
}
