//! Presence — who else is on the canvas, where they point, and what they hold.
//!
//! Presence is ephemeral view state. It travels on `presence:*` messages, is
//! re-broadcast on every local change, and never enters undo history.
//!
//! Soft locks live on the elements themselves (`lockedBy`). They are advisory:
//! the helpers here let UI collaborators decide whether to offer a gesture, but
//! the reducer applies operations regardless of who holds the lock.

#[cfg(test)]
#[path = "presence_test.rs"]
mod presence_test;

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::doc::{Element, ElementId, Point, UserId};

/// Relay-assigned identifier of one live connection.
pub type ConnectionId = String;

/// Colors handed out to collaborators, one per session.
pub const PALETTE: [&str; 10] = [
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#14b8a6", "#3b82f6", "#6366f1", "#a855f7", "#ec4899", "#64748b",
];

/// Pick a palette color at random.
#[must_use]
pub fn random_color() -> String {
    let idx = rand::rng().random_range(0..PALETTE.len());
    PALETTE.get(idx).copied().unwrap_or(PALETTE[0]).to_owned()
}

/// Collaborator role. Carried for the UI; the core does not enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    #[default]
    Editor,
    Viewer,
}

/// One connected collaborator's presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub cursor: Option<Point>,
    #[serde(default)]
    pub selection: Vec<ElementId>,
}

// =============================================================================
// PRESENCE SET
// =============================================================================

/// Presence of every *other* connection in the room.
#[derive(Debug, Clone, Default)]
pub struct PresenceSet {
    self_connection: Option<ConnectionId>,
    peers: HashMap<ConnectionId, PresenceRecord>,
}

impl PresenceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set our own connection id; any record for it is dropped.
    pub fn set_self(&mut self, connection_id: impl Into<ConnectionId>) {
        let connection_id = connection_id.into();
        self.peers.remove(&connection_id);
        self.self_connection = Some(connection_id);
    }

    /// Insert or replace a peer's record. Returns whether the set changed.
    pub fn upsert(&mut self, record: PresenceRecord) -> bool {
        if self.self_connection.as_deref() == Some(record.connection_id.as_str()) {
            return false;
        }
        if self.peers.get(&record.connection_id) == Some(&record) {
            return false;
        }
        self.peers.insert(record.connection_id.clone(), record);
        true
    }

    /// Drop a departed peer. Returns whether it was present.
    pub fn remove(&mut self, connection_id: &str) -> bool {
        self.peers.remove(connection_id).is_some()
    }

    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<&PresenceRecord> {
        self.peers.get(connection_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// All peers, ordered by connection id for stable rendering.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceRecord> {
        let mut records: Vec<PresenceRecord> = self.peers.values().cloned().collect();
        records.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        records
    }

    /// Peers whose selection includes `element_id`.
    #[must_use]
    pub fn selecting(&self, element_id: &str) -> Vec<&PresenceRecord> {
        let mut records: Vec<&PresenceRecord> =
            self.peers.values().filter(|r| r.selection.iter().any(|id| id == element_id)).collect();
        records.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        records
    }
}

// =============================================================================
// SOFT LOCKS
// =============================================================================

/// The user holding the soft lock on `element`, if any.
#[must_use]
pub fn lock_owner(element: &Element) -> Option<&str> {
    element.locked_by.as_deref()
}

/// Whether someone other than `self_id` holds the lock.
#[must_use]
pub fn is_locked_by_other(element: &Element, self_id: &str) -> bool {
    lock_owner(element).is_some_and(|owner| owner != self_id)
}

/// Whether the UI should offer drag/resize/edit gestures to `self_id`.
#[must_use]
pub fn can_edit(element: &Element, self_id: &str) -> bool {
    !is_locked_by_other(element, self_id)
}
