//! Gateway WebSocket connection.
//!
//! A worker connects to the gateway's worker socket, registers its rank and
//! then receives every generation request broadcast to the group. Progress
//! records flow back over the same socket. The connection is re-established
//! with a fixed delay whenever it drops; records published while
//! disconnected are queued and sent after reconnecting.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use vidgen_core::protocol::{GatewayMessage, WorkerMessage};
use vidgen_core::task::GenerationRequest;
use vidgen_events::{ChannelReporter, DisabledReporter, ProgressReporter};

/// Reconnection delay after a WebSocket failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

type WsError = tokio_tungstenite::tungstenite::Error;

/// Outbound half of a worker's gateway link.
///
/// Records published through [`reporter`](Self::reporter) are delivered by
/// [`run`].
pub struct Outbox {
    sender: mpsc::UnboundedSender<WorkerMessage>,
    receiver: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    pub fn reporter(&self) -> ChannelReporter<WorkerMessage> {
        ChannelReporter::new(self.sender.clone())
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep a gateway session alive indefinitely.
///
/// Incoming requests are pushed onto `tasks`. Returns only when `tasks` is
/// closed, i.e. the executor has stopped.
pub async fn run(
    ws_url: &str,
    register: WorkerMessage,
    mut outbox: Outbox,
    tasks: mpsc::UnboundedSender<GenerationRequest>,
) {
    while !tasks.is_closed() {
        tracing::info!(url = %ws_url, "Connecting to gateway WebSocket");

        match connect_async(ws_url).await {
            Ok((ws_stream, _response)) => {
                tracing::info!("Gateway WebSocket connected");
                run_session(ws_stream, &register, &mut outbox.receiver, &tasks).await;
                tracing::warn!("Gateway session ended, reconnecting");
            }
            Err(e) => {
                tracing::error!(error = %e, "Gateway WebSocket connection failed");
            }
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Drive one session: register, then forward outbound messages and queue
/// incoming requests via `tokio::select!`.
async fn run_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    register: &WorkerMessage,
    outbound: &mut mpsc::UnboundedReceiver<WorkerMessage>,
    tasks: &mpsc::UnboundedSender<GenerationRequest>,
) {
    let (mut sink, mut stream) = ws_stream.split();

    if let Err(e) = send_message(&mut sink, register).await {
        tracing::error!(error = %e, "Failed to register with gateway");
        return;
    }

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = send_message(&mut sink, &msg).await {
                    // The record is lost; the gateway sees the task stall.
                    tracing::error!(error = %e, "Failed to send message to gateway");
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_incoming(&text, tasks) {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Gateway closed WebSocket");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        tracing::info!("WebSocket stream exhausted");
                        break;
                    }
                }
            }
        }
    }
}

/// Queue an incoming request. Returns `false` once the executor is gone.
fn handle_incoming(text: &str, tasks: &mpsc::UnboundedSender<GenerationRequest>) -> bool {
    match serde_json::from_str::<GatewayMessage>(text) {
        Ok(GatewayMessage::Generate { request }) => {
            tracing::info!(
                task = %request.task,
                task_id = request.task_id.as_ref().map(|id| id.as_str()).unwrap_or("<none>"),
                "Received generation request",
            );
            tasks.send(request).is_ok()
        }
        Err(e) => {
            tracing::warn!(error = %e, raw = %text, "Unknown or malformed gateway message");
            true
        }
    }
}

async fn send_message<S>(sink: &mut S, msg: &WorkerMessage) -> Result<(), WsError>
where
    S: SinkExt<Message, Error = WsError> + Unpin,
{
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize worker message");
            return Ok(());
        }
    };
    sink.send(Message::Text(json)).await
}

// ---------------------------------------------------------------------------
// One-shot progress channel
// ---------------------------------------------------------------------------

/// Open a progress-only connection for a single CLI job.
///
/// A connection failure is logged and yields a [`DisabledReporter`]. The
/// returned handle finishes once the reporter is dropped and every queued
/// record has been sent.
pub async fn open_progress_channel(
    ws_url: &str,
    register: WorkerMessage,
) -> (Arc<dyn ProgressReporter>, Option<tokio::task::JoinHandle<()>>) {
    let ws_stream = match connect_async(ws_url).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::warn!(url = %ws_url, error = %e, "Progress channel unavailable, reporting disabled");
            return (Arc::new(DisabledReporter), None);
        }
    };

    let Outbox { sender, mut receiver } = Outbox::new();
    let handle = tokio::spawn(async move {
        let (mut sink, _stream) = ws_stream.split();
        if let Err(e) = send_message(&mut sink, &register).await {
            tracing::warn!(error = %e, "Failed to register progress channel");
            return;
        }
        while let Some(msg) = receiver.recv().await {
            if let Err(e) = send_message(&mut sink, &msg).await {
                tracing::warn!(error = %e, "Progress channel closed");
                return;
            }
        }
        let _ = sink.close().await;
    });

    (Arc::new(ChannelReporter::new(sender)), Some(handle))
}
