//! Tuning knobs for the sync core.
//!
//! Every value has a compiled-in default from [`crate::consts`] and may be
//! overridden through the environment. Unparseable values are logged and
//! replaced by the default.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::consts::{DRAG_THROTTLE_MS, HISTORY_LIMIT, JOIN_SETTLE_MS, SYNC_RESPONSE_WINDOW_MS, TEXT_THROTTLE_MS};

/// Timing and capacity settings shared by the bridge, throttle, and sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Minimum spacing between accepted remote drag operations.
    pub drag_interval: Duration,
    /// Minimum spacing between accepted remote text updates.
    pub text_interval: Duration,
    /// Delay after connecting before the `sync-request` is announced.
    pub join_settle: Duration,
    /// How long to wait for a `sync-response` before assuming no peers exist.
    pub response_window: Duration,
    /// Maximum undo stack depth.
    pub history_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drag_interval: Duration::from_millis(DRAG_THROTTLE_MS),
            text_interval: Duration::from_millis(TEXT_THROTTLE_MS),
            join_settle: Duration::from_millis(JOIN_SETTLE_MS),
            response_window: Duration::from_millis(SYNC_RESPONSE_WINDOW_MS),
            history_limit: HISTORY_LIMIT,
        }
    }
}

impl SyncConfig {
    /// Load settings from `CANVAS_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            drag_interval: Duration::from_millis(env_parse("CANVAS_DRAG_THROTTLE_MS", DRAG_THROTTLE_MS)),
            text_interval: Duration::from_millis(env_parse("CANVAS_TEXT_THROTTLE_MS", TEXT_THROTTLE_MS)),
            join_settle: Duration::from_millis(env_parse("CANVAS_JOIN_SETTLE_MS", JOIN_SETTLE_MS)),
            response_window: Duration::from_millis(env_parse(
                "CANVAS_SYNC_RESPONSE_WINDOW_MS",
                SYNC_RESPONSE_WINDOW_MS,
            )),
            history_limit: env_parse("CANVAS_HISTORY_LIMIT", HISTORY_LIMIT),
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "config: unparseable value; using default");
                default
            }
        },
        Err(_) => default,
    }
}
