//! WebSocket bridge: forwards a session's channels to one client.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use parley_core::events::ChannelKind;
use parley_core::ids::SessionId;
use parley_pipeline::ChannelHub;

use crate::server::AppState;

/// GET /ws/{session}
///
/// Subscribes before the upgrade completes, so a client that waits for the
/// handshake and then posts `/generate` sees every event of the run.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let session = SessionId::from_raw(session);
    let hub = state.pipeline.hub().clone();
    let streams = ChannelKind::ALL.map(|kind| BroadcastStream::new(hub.subscribe(&session, kind)));
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| forward(socket, session, streams, hub, shutdown))
}

#[instrument(skip_all, fields(session_id = %session))]
async fn forward(
    socket: WebSocket,
    session: SessionId,
    streams: [BroadcastStream<String>; 3],
    hub: Arc<ChannelHub>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut events = futures::stream::select_all(streams);
    info!("client subscribed");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            incoming = ws_rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Clients only listen; pings are answered by axum.
                Some(Ok(_)) => {}
            },
            event = events.next() => match event {
                Some(Ok(envelope)) => {
                    if ws_tx.send(Message::Text(envelope.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(n))) => {
                    warn!(lagged = n, "client fell behind, events skipped");
                }
                None => break,
            },
        }
    }

    drop(events);
    hub.release_idle(&session);
    info!("client disconnected");
}
