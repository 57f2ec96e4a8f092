//! WebSocket transport: one task per connection
//!
//! The task reads frames in order, writes queued outbound frames, and pings
//! the peer every heartbeat interval. However the loop ends, the session is
//! closed exactly once.

use crate::error::ClientRequestError;
use crate::router::PeerSession;
use crate::server::AppState;
use crate::state::PeerHandle;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Drive one WebSocket connection until it closes or goes silent
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, mut outbound) = mpsc::channel::<String>(state.config.send_queue);
    let mut session = PeerSession::new(state.registry.clone(), PeerHandle::new(tx));
    let peer = session.id();
    info!(%peer, "websocket connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let period = state.config.heartbeat_interval;
    let mut heartbeat = time::interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let Some(frame) = frame else { break };
                last_seen = Instant::now();
                match parse_request(frame) {
                    Ok(Some(text)) => session.handle_text(&text),
                    Ok(None) => {}
                    Err(ClientRequestError::Close) => {
                        debug!(%peer, "client sent close");
                        break;
                    }
                    Err(e @ ClientRequestError::WebSocket(_)) => {
                        warn!(%peer, "read failed: {e}");
                        break;
                    }
                    Err(e) => warn!(%peer, "dropping frame: {e}"),
                }
            }
            Some(frame) = outbound.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    warn!(%peer, "write failed: {e}");
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > state.config.heartbeat_timeout {
                    info!(%peer, "heartbeat timed out");
                    break;
                }
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    debug!(%peer, "ping failed");
                    break;
                }
            }
        }
    }

    session.close();
    let _ = ws_tx.close().await;
}

/// Extract the text of a client frame
///
/// Control frames yield `None`; tungstenite answers pings on its own.
fn parse_request(
    frame: Result<Message, axum::Error>,
) -> Result<Option<String>, ClientRequestError> {
    match frame.map_err(|e| ClientRequestError::WebSocket(e.to_string()))? {
        Message::Text(text) => Ok(Some(text.as_str().to_owned())),
        Message::Binary(_) => Err(ClientRequestError::UnsupportedType),
        Message::Close(_) => Err(ClientRequestError::Close),
        Message::Ping(_) | Message::Pong(_) => Ok(None),
    }
}
