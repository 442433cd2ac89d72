//! WebSocket push of mosaic changes.
//!
//! ## Protocol
//!
//! On connect the server sends a full snapshot, then one message per change:
//! ```json
//! { "type": "snapshot", "placements": [...] }
//! { "type": "placement_added", "placement": {...} }
//! { "type": "placement_removed", "id": "..." }
//! { "type": "error", "message": "..." }
//! ```
//! Clients may send `{ "type": "refresh" }` to get a fresh snapshot.

use crate::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use mosaic_core::{Placement, PlacementId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CHANNEL_CAPACITY: usize = 256;

/// A message sent by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for the full current mosaic
    Refresh,
}

/// A message pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Every settled placement, in commit order
    Snapshot { placements: Vec<Placement> },
    /// A placement was committed
    PlacementAdded { placement: Placement },
    /// A placement was deleted
    PlacementRemoved { id: PlacementId },
    /// Error message
    Error { message: String },
}

pub fn channel() -> broadcast::Sender<ServerMessage> {
    broadcast::channel(CHANNEL_CAPACITY).0
}

/// Publish a change to every connected client.
pub fn publish(events: &broadcast::Sender<ServerMessage>, msg: ServerMessage) {
    // No subscribers is not an error.
    let _ = events.send(msg);
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!("Failed to encode message: {}", e);
            Ok(())
        }
    }
}

fn snapshot(state: &AppState) -> ServerMessage {
    ServerMessage::Snapshot {
        placements: state.service.list(),
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let peer_id = Uuid::new_v4();
    info!("New subscriber: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    // Subscribe before taking the snapshot so no commit falls in between.
    let mut events = state.events.subscribe();

    if send(&mut sender, &snapshot(&state)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Refresh) => snapshot(&state),
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer_id, e);
                                ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                }
                            }
                        };
                        if send(&mut sender, &reply).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary and ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            event = events.recv() => {
                let msg = match event {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Subscriber {} lagged by {} events, resending snapshot", peer_id, skipped);
                        snapshot(&state)
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut sender, &msg).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("Subscriber closed: {}", peer_id);
}
