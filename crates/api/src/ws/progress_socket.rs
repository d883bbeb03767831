use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;
use vidgen_core::progress::ProgressRecord;
use vidgen_core::types::TaskId;
use vidgen_events::{ProgressStream, TaskSubscription};

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    /// Follow a single task; without it every live record is streamed.
    pub task_id: Option<String>,
}

/// GET /api/v1/progress/ws?task_id=… -- stream progress records as JSON
/// text frames.
///
/// For a single task the records already published are replayed first and
/// the socket is closed after the terminal record.
pub async fn progress_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ProgressQuery>,
    State(state): State<crate::state::AppState>,
) -> impl IntoResponse {
    let task_id = query.task_id.map(TaskId::from);
    ws.on_upgrade(move |socket| stream_progress(socket, state.progress, task_id))
}

enum RecordFeed {
    Task(TaskSubscription),
    All(broadcast::Receiver<ProgressRecord>),
}

impl RecordFeed {
    async fn next(&mut self) -> Option<ProgressRecord> {
        match self {
            Self::Task(subscription) => subscription.next().await,
            Self::All(receiver) => loop {
                match receiver.recv().await {
                    Ok(record) => return Some(record),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Progress socket lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }
}

async fn stream_progress(socket: WebSocket, progress: Arc<ProgressStream>, task_id: Option<TaskId>) {
    let mut feed = match &task_id {
        Some(id) => RecordFeed::Task(progress.subscribe_task(id)),
        None => RecordFeed::All(progress.subscribe()),
    };
    let (mut sink, mut incoming) = socket.split();
    tracing::debug!(task_id = ?task_id, "Progress socket opened");

    loop {
        tokio::select! {
            record = feed.next() => {
                let Some(record) = record else {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let text = match serde_json::to_string(&record) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode progress record");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming_msg = incoming.next() => match incoming_msg {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!(task_id = ?task_id, "Progress socket closed");
}
