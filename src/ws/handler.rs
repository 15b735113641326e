//! WebSocket upgrade handler

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitStream;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::game::{JoinError, SessionId};
use crate::util::rate_limit::MovementRateLimiter;
use crate::ws::connection::Connection;
use crate::ws::protocol::{ClientMsg, ErrorReply, Handshake};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, mut ws_stream) = socket.split();
    let connection = Arc::new(Connection::new(ws_sink, state.config.write_timeout));

    let handshake = match read_handshake(&mut ws_stream, state.config.handshake_timeout).await {
        Ok(Some(handshake)) => handshake,
        Ok(None) => {
            debug!("Socket closed before handshake");
            return;
        }
        Err(e) => {
            reject(&connection, e).await;
            return;
        }
    };

    let id = match state.server.join(handshake, Arc::clone(&connection)).await {
        Ok(id) => id,
        Err(e) => {
            reject(&connection, e).await;
            return;
        }
    };

    run_session(&state, id, ws_stream).await;

    state.server.leave(id).await;
    info!(session_id = %id, "WebSocket connection closed");
}

/// Wait for the first text frame and decode it as a handshake
///
/// `Ok(None)` means the peer went away first.
async fn read_handshake(
    ws_stream: &mut SplitStream<WebSocket>,
    limit: Duration,
) -> Result<Option<Handshake>, JoinError> {
    let first = tokio::time::timeout(limit, async {
        while let Some(result) = ws_stream.next().await {
            match result {
                Ok(Message::Text(text)) => return Ok(Some(text)),
                Ok(Message::Binary(_)) => {
                    return Err(JoinError::Malformed("expected a text frame".into()))
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(_)) | Err(_) => return Ok(None),
            }
        }
        Ok(None)
    })
    .await
    .map_err(|_| JoinError::Malformed("handshake timed out".into()))??;

    match first {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| JoinError::Malformed(e.to_string())),
        None => Ok(None),
    }
}

/// Tell the client why it was turned away, then hang up
async fn reject(connection: &Connection, reason: JoinError) {
    info!(reason = %reason, "Handshake rejected");
    let reply = ErrorReply {
        error: reason.to_string(),
    };
    if let Err(e) = connection.send(&reply).await {
        debug!(error = %e, "Failed to deliver rejection");
    }
    connection.close().await;
}

/// Reader loop: WebSocket -> game server
async fn run_session(state: &AppState, id: SessionId, mut ws_stream: SplitStream<WebSocket>) {
    let rate_limiter = MovementRateLimiter::new(state.config.movement_rate_limit);

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(msg) => {
                    if msg.is_movement() && !rate_limiter.check() {
                        debug!(session_id = %id, "Rate limited movement intent");
                        continue;
                    }
                    state.server.handle_message(id, msg).await;
                }
                Err(e) => {
                    debug!(session_id = %id, error = %e, "Dropped undecodable message");
                }
            },
            Ok(Message::Binary(_)) => {
                debug!(session_id = %id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %id, "Client initiated close");
                break;
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}
