//! WebSocket handler — room-scoped broadcast relay.
//!
//! DESIGN
//! ======
//! The relay is the transport under the sync core and nothing more. It holds
//! no document state, arbitrates no conflicts, and never rewrites a frame.
//! On upgrade it assigns a connection id and enters a `select!` loop:
//! - Incoming client frames → shape check → broadcast to the whole room
//!   (sender included; clients drop their own echoes). `session:*` and
//!   `presence:leave` are relay-issued and never accepted from a client.
//! - Frames from room peers → forward to the client
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with the connection id
//! 2. Join the room
//! 3. Relay frames until the socket closes
//! 4. Broadcast `presence:leave` to the remaining peers → part the room

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use canvas::protocol::{self, PresenceMessage, ProtocolError, SessionMessage};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::room;
use crate::state::AppState;

const MAX_ROOM_LEN: usize = 128;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("`{kind}` frames are issued only by the relay")]
    Reserved { kind: String },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomNameError {
    #[error("room name must not be empty")]
    Empty,
    #[error("room name exceeds {MAX_ROOM_LEN} characters")]
    TooLong,
    #[error("room name may contain only letters, digits, '-' and '_'")]
    InvalidCharacter,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, Path(room): Path<String>, ws: WebSocketUpgrade) -> Response {
    if let Err(e) = validate_room(&room) {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    ws.on_upgrade(move |socket| run_ws(socket, state, room))
}

fn validate_room(room: &str) -> Result<(), RoomNameError> {
    if room.is_empty() {
        return Err(RoomNameError::Empty);
    }
    if room.len() > MAX_ROOM_LEN {
        return Err(RoomNameError::TooLong);
    }
    if !room.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(RoomNameError::InvalidCharacter);
    }
    Ok(())
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, room: String) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for frames broadcast by room peers.
    let (client_tx, mut client_rx) = mpsc::channel::<String>(state.config.channel_capacity);

    let welcome = SessionMessage::Connected { connection_id: client_id.to_string() };
    let Some(welcome) = encode_or_warn(welcome.into()) else {
        return;
    };
    if send_text(&mut socket, welcome).await.is_err() {
        return;
    }

    let members = room::join_room(&state, &room, client_id, client_tx).await;
    info!(%room, %client_id, members, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        if let Err(e) = process_inbound_text(&state, &room, client_id, text.as_str()).await {
                            warn!(%room, %client_id, error = %e, "ws: dropping invalid frame");
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(text) = client_rx.recv() => {
                if send_text(&mut socket, text).await.is_err() {
                    break;
                }
            }
        }
    }

    // Tell peers before parting so their presence lists drop this connection.
    let leave = PresenceMessage::Leave { connection_id: client_id.to_string() };
    if let Some(text) = encode_or_warn(leave.into()) {
        room::broadcast(&state, &room, &text, Some(client_id)).await;
    }
    room::part_room(&state, &room, client_id).await;
    info!(%room, %client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Check one inbound text frame and relay it verbatim to the room.
///
/// Returns the number of members that accepted the frame.
async fn process_inbound_text(state: &AppState, room: &str, client_id: Uuid, text: &str) -> Result<usize, FrameError> {
    let kind = inspect_frame(text, state.config.max_frame_bytes)?;
    let delivered = room::broadcast(state, room, text, None).await;
    debug!(%room, %client_id, kind, delivered, "ws: relayed frame");
    Ok(delivered)
}

/// A relayable frame is a JSON object carrying a string `type` that clients
/// may send. Returns the type.
fn inspect_frame(text: &str, max_bytes: usize) -> Result<String, FrameError> {
    if text.len() > max_bytes {
        return Err(FrameError::TooLarge { size: text.len(), limit: max_bytes });
    }
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::from)?;
    let kind = protocol::message_type(&value).ok_or(ProtocolError::MissingType)?;
    if is_relay_only(kind) {
        return Err(FrameError::Reserved { kind: kind.to_owned() });
    }
    Ok(kind.to_owned())
}

/// Session greetings and departures describe the transport, so only the relay speaks them.
fn is_relay_only(kind: &str) -> bool {
    kind.starts_with("session:") || kind == "presence:leave"
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_text(socket: &mut WebSocket, text: String) -> Result<(), axum::Error> {
    socket.send(Message::Text(text.into())).await
}

fn encode_or_warn(message: protocol::Message) -> Option<String> {
    match protocol::encode(&message) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "ws: failed to encode relay message");
            None
        }
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
