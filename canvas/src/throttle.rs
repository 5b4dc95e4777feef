//! Remote operation throttling.
//!
//! DESIGN
//! ======
//! Two global gates, not keyed by element or author:
//! - `element:drag`: at most one accepted per drag interval (default 40 ms)
//! - `text:update`: at most one accepted per text interval (default 300 ms)
//!
//! Every other operation passes unconditionally. Only *accepted* operations
//! advance a gate, so a steady stream is sampled rather than starved.
//!
//! Local operations are never throttled; this applies to inbound traffic only.

#[cfg(test)]
#[path = "throttle_test.rs"]
mod throttle_test;

use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::operation::{Action, Operation};

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("remote {kind} throttled ({elapsed_ms}ms since last, min {interval_ms}ms)")]
    TooSoon { kind: &'static str, elapsed_ms: u128, interval_ms: u128 },
}

// =============================================================================
// THROTTLE
// =============================================================================

#[derive(Debug, Clone, Default)]
struct Gate {
    interval: Duration,
    last_accepted: Option<Instant>,
}

impl Gate {
    fn new(interval: Duration) -> Self {
        Self { interval, last_accepted: None }
    }

    fn check_at(&mut self, kind: &'static str, now: Instant) -> Result<(), ThrottleError> {
        if let Some(last) = self.last_accepted {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.interval {
                return Err(ThrottleError::TooSoon {
                    kind,
                    elapsed_ms: elapsed.as_millis(),
                    interval_ms: self.interval.as_millis(),
                });
            }
        }
        self.last_accepted = Some(now);
        Ok(())
    }
}

/// Global rate gates for inbound `element:drag` and `text:update` operations.
#[derive(Debug, Clone)]
pub struct RemoteThrottle {
    drag: Gate,
    text: Gate,
}

impl Default for RemoteThrottle {
    fn default() -> Self {
        Self::new(&SyncConfig::default())
    }
}

impl RemoteThrottle {
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self { drag: Gate::new(config.drag_interval), text: Gate::new(config.text_interval) }
    }

    /// Decide whether a remote operation should be applied now.
    pub fn check(&mut self, op: &Operation) -> Result<(), ThrottleError> {
        self.check_at(op, Instant::now())
    }

    /// Internal: check with explicit timestamp (for testing and host-driven clocks).
    pub fn check_at(&mut self, op: &Operation, now: Instant) -> Result<(), ThrottleError> {
        match op.action {
            Action::Drag { .. } => self.drag.check_at(op.kind(), now),
            Action::TextUpdate { .. } => self.text.check_at(op.kind(), now),
            _ => Ok(()),
        }
    }

    /// Forget accepted timestamps, e.g. after a full resync.
    pub fn reset(&mut self) {
        self.drag.last_accepted = None;
        self.text.last_accepted = None;
    }
}
