//! Snapshot subscription WebSocket handler
//!
//! The socket is registered as soon as the upgrade completes. From then on it
//! receives every snapshot broadcast until it disconnects or is evicted.
//! Inbound frames are read only to notice the close.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::WS_BUFFER_SIZE;
use crate::api::server::AppState;
use crate::broadcast::Connection;

/// WebSocket handler for the snapshot feed
pub async fn subscribe_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_subscription(socket, state))
}

/// Handle one subscriber connection
async fn handle_subscription(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (connection, mut rx) = Connection::new(WS_BUFFER_SIZE);
    let id = connection.id();

    state.registry.register(connection);
    info!("Subscriber {} connected ({} total)", id, state.registry.len());

    let send_timeout = state.send_timeout;

    // Ends when the registry drops this connection or the socket stops accepting
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match timeout(send_timeout, sender.send(Message::Text(frame.to_string()))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Subscriber {} write failed: {}", id, e);
                    break;
                }
                Err(_) => {
                    warn!(
                        "Subscriber {} write stalled for {}s",
                        id,
                        send_timeout.as_secs()
                    );
                    break;
                }
            }
        }
        // A stalled peer never lets the close frame flush
        if timeout(send_timeout, sender.close()).await.is_err() {
            debug!("Subscriber {} close timed out, dropping socket", id);
        }
    });

    let mut receive_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("Subscriber {} sent close", id);
                    break;
                }
                Err(e) => {
                    debug!("Subscriber {} read error: {}", id, e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {}
        _ = &mut receive_task => {}
    }

    send_task.abort();
    receive_task.abort();
    let _ = tokio::join!(send_task, receive_task);

    if state.registry.unregister(id) {
        info!("Subscriber {} disconnected", id);
    } else {
        info!("Subscriber {} closed after eviction", id);
    }
}
