//! Room service — membership and fan-out.
//!
//! DESIGN
//! ======
//! A room is a named broadcast channel. Joining registers the connection's
//! outbound sender; parting removes it and evicts the room once empty.
//! Broadcast is best-effort: a member whose channel is full or closed simply
//! misses the frame, matching the at-most-once delivery the sync core assumes.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::{AppState, RoomState};

/// Active room and its member count, for the listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    pub room: String,
    pub members: usize,
}

// =============================================================================
// JOIN / PART
// =============================================================================

/// Register `client_id` in `room`. Returns the member count after joining.
pub async fn join_room(state: &AppState, room: &str, client_id: Uuid, tx: mpsc::Sender<String>) -> usize {
    let mut rooms = state.rooms.write().await;
    let room_state = rooms.entry(room.to_owned()).or_insert_with(RoomState::new);
    room_state.clients.insert(client_id, tx);
    let members = room_state.clients.len();
    info!(%room, %client_id, members, "client joined room");
    members
}

/// Remove `client_id` from `room`, evicting the room when it empties.
pub async fn part_room(state: &AppState, room: &str, client_id: Uuid) {
    let mut rooms = state.rooms.write().await;
    let Some(room_state) = rooms.get_mut(room) else {
        return;
    };
    room_state.clients.remove(&client_id);
    let remaining = room_state.clients.len();
    info!(%room, %client_id, remaining, "client left room");
    if remaining == 0 {
        rooms.remove(room);
        info!(%room, "evicted empty room");
    }
}

// =============================================================================
// BROADCAST
// =============================================================================

/// Send `text` to every member of `room`, optionally excluding one.
/// Returns how many members accepted the frame.
pub async fn broadcast(state: &AppState, room: &str, text: &str, exclude: Option<Uuid>) -> usize {
    let rooms = state.rooms.read().await;
    let Some(room_state) = rooms.get(room) else {
        return 0;
    };

    let mut delivered = 0;
    for (client_id, tx) in &room_state.clients {
        if exclude == Some(*client_id) {
            continue;
        }
        match tx.try_send(text.to_owned()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => debug!(%room, %client_id, "broadcast: channel full; frame dropped"),
            Err(TrySendError::Closed(_)) => debug!(%room, %client_id, "broadcast: channel closed"),
        }
    }
    delivered
}

// =============================================================================
// QUERIES
// =============================================================================

/// Every active room, ordered by name.
pub async fn list_rooms(state: &AppState) -> Vec<RoomSummary> {
    let rooms = state.rooms.read().await;
    let mut out: Vec<RoomSummary> = rooms
        .iter()
        .map(|(room, room_state)| RoomSummary { room: room.clone(), members: room_state.clients.len() })
        .collect();
    out.sort_by(|a, b| a.room.cmp(&b.room));
    out
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
