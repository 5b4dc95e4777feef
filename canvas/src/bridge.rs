//! Collaboration bridge — local-apply-then-broadcast, remote-apply-with-dedup.
//!
//! DESIGN
//! ======
//! The bridge is the only collaborator UI code talks to. It owns the store,
//! the presence set, the sync state machine, and the remote throttle.
//!
//! - Local operations are applied immediately (optimistic, no round trip)
//!   and queued verbatim for broadcast.
//! - Remote operations are dropped if we authored them (echo suppression),
//!   dropped until the sync handshake completes, rate limited for
//!   `element:drag`/`text:update`, and otherwise applied in receipt order.
//! - Undo/redo only ever touch this client's own history; their effects are
//!   broadcast like any other local operation.
//!
//! The bridge performs no I/O. Hosts feed inbound frames to `receive`, drive
//! timers with `tick`, and drain `take_outbound` onto the transport, the same
//! way the render host drains engine actions.
//!
//! ERROR HANDLING
//! ==============
//! Nothing inbound can fail the bridge: malformed or unknown messages are
//! logged at `debug` and dropped.

#[cfg(test)]
#[path = "bridge_test.rs"]
mod bridge_test;

use std::time::Instant;

use tracing::debug;

use crate::config::SyncConfig;
use crate::doc::{DocStore, ElementId, Point, UserId};
use crate::gesture::Commit;
use crate::history::History;
use crate::operation::{Action, Operation};
use crate::presence::{ConnectionId, PresenceRecord, PresenceSet, Role, random_color};
use crate::protocol::{Message, PresenceMessage, SessionMessage, SyncMessage, decode};
use crate::store::{Change, Store, SubscriptionId};
use crate::sync::{SyncAction, SyncProtocol, SyncState};
use crate::throttle::RemoteThrottle;

/// Who this client is, for authorship and presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub name: String,
    pub color: String,
    pub role: Role,
}

impl Identity {
    /// An editor identity with a random palette color.
    pub fn new(user_id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), name: name.into(), color: random_color(), role: Role::Editor }
    }
}

pub struct Bridge {
    identity: Identity,
    connection_id: Option<ConnectionId>,
    store: Store,
    presence: PresenceSet,
    sync: SyncProtocol,
    throttle: RemoteThrottle,
    cursor: Option<Point>,
    outbound: Vec<Message>,
}

impl Bridge {
    #[must_use]
    pub fn new(identity: Identity, config: &SyncConfig) -> Self {
        Self {
            identity,
            connection_id: None,
            store: Store::new(History::new(config.history_limit)),
            presence: PresenceSet::new(),
            sync: SyncProtocol::new(config),
            throttle: RemoteThrottle::new(config),
            cursor: None,
            outbound: Vec::new(),
        }
    }

    // --- Reads ---

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn doc(&self) -> &DocStore {
        self.store.doc()
    }

    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    /// Other connected users, ordered by connection id.
    #[must_use]
    pub fn presence(&self) -> Vec<PresenceRecord> {
        self.presence.snapshot()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(Change) + Send + 'static) -> SubscriptionId {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Drain messages waiting to be broadcast.
    pub fn take_outbound(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbound)
    }

    // --- Lifecycle ---

    /// The transport assigned us `connection_id`; start the join handshake.
    pub fn connect_at(&mut self, connection_id: impl Into<ConnectionId>, now: Instant) {
        let connection_id = connection_id.into();
        debug!(%connection_id, user_id = %self.identity.user_id, "bridge: connected");
        self.presence.set_self(connection_id.clone());
        self.sync.connect_at(connection_id.clone(), now);
        self.connection_id = Some(connection_id);
        self.queue_presence();
    }

    /// Tear down: cancels the pending join timer.
    pub fn disconnect(&mut self) {
        self.sync.cancel();
        self.connection_id = None;
    }

    /// When the host should next call `tick`, if a timer is armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sync.next_deadline()
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Fire due timers.
    pub fn tick_at(&mut self, now: Instant) {
        if let Some(request) = self.sync.poll_at(now) {
            self.outbound.push(request.into());
        }
    }

    // --- Local operations ---

    /// Stamp `action` as authored by this client.
    #[must_use]
    pub fn op(&self, action: Action) -> Operation {
        Operation::new(self.identity.user_id.clone(), action)
    }

    /// Apply a local operation and queue it for broadcast. Returns whether local state changed.
    pub fn apply_local(&mut self, op: Operation) -> bool {
        let changed = self.store.apply_recorded(&op);
        self.outbound.push(op.into());
        changed
    }

    /// Like `apply_local`, with the undo inverse computed against `baseline`.
    pub fn apply_local_with_baseline(&mut self, op: Operation, baseline: &DocStore) -> bool {
        let changed = self.store.apply_recorded_with_baseline(&op, baseline);
        self.outbound.push(op.into());
        changed
    }

    /// Shorthand for `apply_local(self.op(action))`.
    pub fn apply_action(&mut self, action: Action) -> bool {
        let op = self.op(action);
        self.apply_local(op)
    }

    /// Apply the terminal operation of a gesture.
    pub fn commit_gesture(&mut self, commit: Commit) -> bool {
        let op = self.op(commit.action);
        self.apply_local_with_baseline(op, &commit.baseline)
    }

    /// Remove an element, attaching its full state so the removal can be undone.
    pub fn remove_element(&mut self, id: &str) -> bool {
        let Some(element) = self.store.element(id).cloned() else {
            debug!(element_id = %id, "bridge: remove of unknown element");
            return false;
        };
        self.apply_action(Action::remove(element))
    }

    /// Undo this client's latest operation and broadcast the inverse.
    pub fn undo(&mut self) -> bool {
        match self.store.undo() {
            Some(inverse) => {
                self.outbound.push(inverse.into());
                true
            }
            None => false,
        }
    }

    /// Redo this client's latest undone operation and broadcast it.
    pub fn redo(&mut self) -> bool {
        match self.store.redo() {
            Some(op) => {
                self.outbound.push(op.into());
                true
            }
            None => false,
        }
    }

    /// Force every peer to adopt our state.
    pub fn broadcast_full_sync(&mut self) -> bool {
        let Some(sender_id) = self.connection_id.clone() else {
            debug!("bridge: full-sync before connect");
            return false;
        };
        self.outbound.push(
            SyncMessage::FullSync {
                sender_id,
                elements: self.store.doc().snapshot_elements(),
                canvas: self.store.canvas().clone(),
            }
            .into(),
        );
        true
    }

    // --- Presence ---

    pub fn set_cursor(&mut self, cursor: Option<Point>) {
        if self.cursor == cursor {
            return;
        }
        self.cursor = cursor;
        self.queue_presence();
    }

    pub fn set_selection(&mut self, ids: Vec<ElementId>) {
        if self.store.set_selection(ids) {
            self.queue_presence();
        }
    }

    fn presence_record(&self) -> Option<PresenceRecord> {
        Some(PresenceRecord {
            connection_id: self.connection_id.clone()?,
            user_id: self.identity.user_id.clone(),
            name: self.identity.name.clone(),
            color: self.identity.color.clone(),
            role: self.identity.role,
            cursor: self.cursor,
            selection: self.store.selection().to_vec(),
        })
    }

    fn queue_presence(&mut self) {
        if let Some(record) = self.presence_record() {
            self.outbound.push(PresenceMessage::Update(record).into());
        }
    }

    // --- Remote ---

    pub fn receive(&mut self, text: &str) {
        self.receive_at(text, Instant::now());
    }

    /// Handle one inbound text frame.
    pub fn receive_at(&mut self, text: &str, now: Instant) {
        match decode(text) {
            Ok(message) => self.receive_message_at(message, now),
            Err(err) => debug!(error = %err, "bridge: dropping malformed message"),
        }
    }

    pub fn receive_message_at(&mut self, message: Message, now: Instant) {
        match message {
            Message::Operation(op) => {
                self.apply_remote_at(&op, now);
            }
            Message::Sync(msg) => self.handle_sync(msg),
            Message::Presence(PresenceMessage::Update(record)) => {
                if self.presence.upsert(record) {
                    self.store.notify(Change::Presence);
                }
            }
            Message::Presence(PresenceMessage::Leave { connection_id }) => {
                if self.presence.remove(&connection_id) {
                    self.store.notify(Change::Presence);
                }
            }
            Message::Session(SessionMessage::Connected { connection_id }) => {
                // Only the relay's greeting on a fresh transport starts a handshake.
                if let Some(current) = &self.connection_id {
                    debug!(%current, claimed = %connection_id, "bridge: ignoring session:connected while connected");
                    return;
                }
                self.connect_at(connection_id, now);
            }
        }
    }

    /// Apply a peer's operation. Returns whether local state changed.
    pub fn apply_remote_at(&mut self, op: &Operation, now: Instant) -> bool {
        if op.user_id == self.identity.user_id {
            return false;
        }
        if !self.sync.is_synced() {
            debug!(op = op.kind(), "bridge: dropping operation before sync");
            return false;
        }
        if let Err(err) = self.throttle.check_at(op, now) {
            debug!(error = %err, "bridge: throttled");
            return false;
        }
        self.store.apply(op)
    }

    fn handle_sync(&mut self, msg: SyncMessage) {
        let requester = match &msg {
            SyncMessage::Request { requester_id } => Some(requester_id.clone()),
            _ => None,
        };
        match self.sync.handle(msg, self.store.doc().len()) {
            SyncAction::None => {}
            SyncAction::Reply { requester_id } => {
                self.outbound.push(
                    SyncMessage::Response {
                        requester_id,
                        elements: self.store.doc().snapshot_elements(),
                        canvas: self.store.canvas().clone(),
                    }
                    .into(),
                );
            }
            SyncAction::Load { elements, canvas } => {
                self.store.load_snapshot(elements, canvas);
                self.throttle.reset();
            }
        }
        // Introduce ourselves to a newcomer so their presence list is complete.
        if requester.is_some_and(|id| Some(id) != self.connection_id) {
            self.queue_presence();
        }
    }
}
