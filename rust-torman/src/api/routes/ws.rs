//! Push channel: WebSocket job-list updates.
//!
//! Clients open one long-lived connection and receive a structured update
//! message on every monitor tick (and promptly after a submission, via the
//! wake notify). Client-sent messages are treated purely as liveness
//! signals; disconnection is detected on send failure.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::api::server::AppState;

/// WebSocket handler for real-time job updates.
pub async fn push_updates(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Forward broadcast updates to the socket until either side goes away.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let broadcaster = state.context.broadcaster.clone();
    let (client_id, mut updates) = broadcaster.register();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            update = updates.recv() => {
                match update {
                    Some(message) => {
                        if sender.send(message).await.is_err() {
                            break;
                        }
                    }
                    // Pruned by the broadcaster after a failed send.
                    None => break,
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    // Anything else a client sends is only a liveness signal.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(client = %client_id, error = %e, "websocket error");
                        break;
                    }
                }
            }
        }
    }

    broadcaster.unregister(&client_id);
}
