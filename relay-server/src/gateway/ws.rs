//! WebSocket handler for chat sessions.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    upgrade(ws, state, connect_info.map(|ConnectInfo(addr)| addr))
}

/// Accept the upgrade and hand the socket to a session task.
pub fn upgrade(ws: WebSocketUpgrade, state: Arc<AppState>, addr: Option<SocketAddr>) -> Response {
    tracing::debug!("Chat upgrade request from {:?}", addr);
    ws.on_upgrade(move |socket| handle_session(socket, state, addr))
}

/// Drive one session from upgrade to disconnect.
async fn handle_session(socket: WebSocket, state: Arc<AppState>, addr: Option<SocketAddr>) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut handle = state.registry.register(addr).await;
    let session_id = handle.id.clone();
    tracing::info!(
        "Client connected: session {} from {:?} ({} connected)",
        session_id,
        addr,
        state.registry.count().await
    );

    // Main message loop
    loop {
        tokio::select! {
            // Outbound frames (broadcasts and replies for this session)
            outbound = handle.outbound.recv() => {
                let Some(frame) = outbound else {
                    tracing::debug!("Outbound channel closed for session {}", session_id);
                    break;
                };
                if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                    tracing::warn!("Failed to send to session {}: {}", session_id, e);
                    break;
                }
            }

            // Inbound frames (from the client)
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        state.relay.handle_frame(&session_id, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            tracing::warn!("Failed to send pong to session {}: {}", session_id, e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::debug!("Session {} sent close frame", session_id);
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!("Dropping binary frame from session {}", session_id);
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error from session {}: {}", session_id, e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    match state.registry.unregister(&session_id).await {
        Some(session) => tracing::info!(
            "Client disconnected: session {} after {}s",
            session_id,
            (chrono::Utc::now() - session.connected_at).num_seconds()
        ),
        None => tracing::info!("Client disconnected: session {}", session_id),
    }
}
