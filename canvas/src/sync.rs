//! Late-joiner synchronization state machine.
//!
//! DESIGN
//! ======
//! `Idle → AwaitingJoinWindow → AwaitingSyncResponse → Synced`
//!
//! - `connect_at` arms the join-settle timer (default 500 ms).
//! - `poll_at` fires it once, producing the `sync-request` to broadcast.
//! - If no peer answers within the response window the client is alone and
//!   moves to `Synced` with whatever it holds.
//! - Any connected peer answers another connection's `sync-request`, whatever
//!   its own state. A peer still waiting out its own window may already hold
//!   elements the joiner would otherwise never see.
//! - A `sync-response` addressed to us is applied only when it carries strictly
//!   more elements than we hold. Evaluation continues after `Synced`, so among
//!   several responses the largest wins regardless of arrival order.
//! - `full-sync` always applies unless we sent it.
//!
//! The machine is clock-injected and performs no I/O. The host decides when
//! to call `poll_at` (see `next_deadline`) and carries out the returned action.

#[cfg(test)]
#[path = "sync_test.rs"]
mod sync_test;

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::doc::{CanvasConfig, Element};
use crate::presence::ConnectionId;
use crate::protocol::SyncMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    AwaitingJoinWindow { deadline: Instant },
    AwaitingSyncResponse { deadline: Instant },
    Synced,
}

/// What the host must do in response to a sync message.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    None,
    /// Answer a joiner with our full state.
    Reply { requester_id: ConnectionId },
    /// Destructively replace local state.
    Load { elements: Vec<Element>, canvas: CanvasConfig },
}

#[derive(Debug, Clone)]
pub struct SyncProtocol {
    state: SyncState,
    connection_id: Option<ConnectionId>,
    join_settle: Duration,
    response_window: Duration,
}

impl Default for SyncProtocol {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

impl SyncProtocol {
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            state: SyncState::Idle,
            connection_id: None,
            join_settle: config.join_settle,
            response_window: config.response_window,
        }
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        self.state
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Incremental operations are accepted only once bootstrapped.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.state == SyncState::Synced
    }

    /// The transport is up; schedule the `sync-request`.
    pub fn connect_at(&mut self, connection_id: impl Into<ConnectionId>, now: Instant) {
        let connection_id = connection_id.into();
        debug!(%connection_id, "sync: awaiting join window");
        self.connection_id = Some(connection_id);
        self.state = SyncState::AwaitingJoinWindow { deadline: now + self.join_settle };
    }

    /// The transport is gone. Disarm any pending timer and forget our connection id.
    pub fn cancel(&mut self) {
        if !matches!(self.state, SyncState::Idle) {
            debug!(state = ?self.state, "sync: cancelled");
        }
        self.state = SyncState::Idle;
        self.connection_id = None;
    }

    /// When the host should next call `poll_at`, if a timer is armed.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            SyncState::AwaitingJoinWindow { deadline } | SyncState::AwaitingSyncResponse { deadline } => {
                Some(deadline)
            }
            SyncState::Idle | SyncState::Synced => None,
        }
    }

    /// Advance timers. Returns the `sync-request` to broadcast when the join window closes.
    pub fn poll_at(&mut self, now: Instant) -> Option<SyncMessage> {
        match self.state {
            SyncState::AwaitingJoinWindow { deadline } if now >= deadline => {
                let requester_id = self.connection_id.clone()?;
                self.state = SyncState::AwaitingSyncResponse { deadline: now + self.response_window };
                debug!(%requester_id, "sync: requesting state");
                Some(SyncMessage::Request { requester_id })
            }
            SyncState::AwaitingSyncResponse { deadline } if now >= deadline => {
                info!("sync: no peer answered; starting from local state");
                self.state = SyncState::Synced;
                None
            }
            _ => None,
        }
    }

    /// Decide what to do with an inbound sync message given our element count.
    pub fn handle(&mut self, message: SyncMessage, local_count: usize) -> SyncAction {
        match message {
            SyncMessage::Request { requester_id } => {
                if self.connection_id.is_none() || self.is_own(&requester_id) {
                    return SyncAction::None;
                }
                SyncAction::Reply { requester_id }
            }
            SyncMessage::Response { requester_id, elements, canvas } => {
                if !self.is_own(&requester_id) {
                    return SyncAction::None;
                }
                if !matches!(self.state, SyncState::AwaitingSyncResponse { .. } | SyncState::Synced) {
                    debug!("sync: response before request; ignoring");
                    return SyncAction::None;
                }
                self.state = SyncState::Synced;
                if elements.len() > local_count {
                    info!(remote = elements.len(), local = local_count, "sync: applying response");
                    SyncAction::Load { elements, canvas }
                } else {
                    debug!(remote = elements.len(), local = local_count, "sync: keeping local state");
                    SyncAction::None
                }
            }
            SyncMessage::FullSync { sender_id, elements, canvas } => {
                if self.is_own(&sender_id) {
                    return SyncAction::None;
                }
                info!(%sender_id, elements = elements.len(), "sync: full resync");
                self.state = SyncState::Synced;
                SyncAction::Load { elements, canvas }
            }
        }
    }

    fn is_own(&self, connection_id: &str) -> bool {
        self.connection_id.as_deref() == Some(connection_id)
    }
}
