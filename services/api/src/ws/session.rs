//! Manages the primary WebSocket connection lifecycle for a voice session.

use super::{
    channel::ClientChannel,
    orchestrator::{EVENT_QUEUE_DEPTH, Orchestrator, SessionEvent},
    protocol::{ClientMessage, ServerMessage},
};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

/// Outbound events buffered per client before the orchestrator waits on the socket.
const OUTBOUND_BUFFER: usize = 64;

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Every connection gets its own session id, registry entry and orchestrator
/// task. The socket's read half is pumped into the orchestrator's event queue
/// here; the write half is owned by a writer task fed through a channel.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    tracing::Span::current().record("session_id", session_id.to_string());
    info!("Client connected.");

    let record = state.registry.register(session_id).await;
    let (mut socket_tx, mut socket_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    let writer = tokio::spawn(
        async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = send_msg(&mut socket_tx, msg).await {
                    warn!(error = ?e, "Failed to write to client WebSocket.");
                    break;
                }
            }
            let _ = socket_tx.close().await;
        }
        .in_current_span(),
    );

    let client = ClientChannel::new(outbound_tx);
    client
        .emit(ServerMessage::SessionStarted { session_id })
        .await;

    let orchestrator = Orchestrator::new(
        session_id,
        state.services.clone(),
        client,
        events_tx.clone(),
        record,
    );
    let runtime = tokio::spawn(orchestrator.run(events_rx).in_current_span());

    if let Err(e) = read_client_messages(&mut socket_rx, &events_tx).await {
        error!(error = ?e, "Error receiving from client WebSocket.");
    }

    let _ = events_tx.send(SessionEvent::Disconnected).await;
    if let Err(e) = runtime.await {
        error!(error = ?e, "Session orchestrator task failed.");
    }
    // The orchestrator dropped the only outbound sender, so the writer drains and exits.
    let _ = writer.await;

    state.registry.remove(session_id).await;
    info!("WebSocket connection closed and session terminated.");
}

/// Translates client frames into session events until the client leaves.
async fn read_client_messages(
    socket_rx: &mut SplitStream<WebSocket>,
    events_tx: &mpsc::Sender<SessionEvent>,
) -> Result<()> {
    while let Some(msg_result) = socket_rx.next().await {
        let event = match msg_result? {
            Message::Binary(data) => {
                if !queue_audio(events_tx, data) {
                    break;
                }
                continue;
            }
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => msg.into(),
                Err(e) => {
                    warn!(error = %e, "Ignoring unrecognized text message.");
                    continue;
                }
            },
            Message::Close(_) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        if events_tx.send(event).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Queues a mic frame without waiting. A full queue drops the frame, since
/// stale audio is worthless. Returns `false` once the orchestrator is gone.
fn queue_audio(events_tx: &mpsc::Sender<SessionEvent>, chunk: Bytes) -> bool {
    match events_tx.try_send(SessionEvent::Audio(chunk)) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("Session event queue full; dropping audio frame.");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_audio_dropped_when_event_queue_is_full() {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        assert!(queue_audio(&events_tx, Bytes::from_static(b"first")));
        assert!(queue_audio(&events_tx, Bytes::from_static(b"second")));

        match events_rx.try_recv() {
            Ok(SessionEvent::Audio(chunk)) => assert_eq!(chunk, Bytes::from_static(b"first")),
            other => panic!("expected the first frame, got {:?}", other),
        }
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_audio_reports_closed_session() {
        let (events_tx, events_rx) = mpsc::channel(1);
        drop(events_rx);
        assert!(!queue_audio(&events_tx, Bytes::from_static(b"late")));
    }
}
