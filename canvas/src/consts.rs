//! Shared numeric constants for the canvas crate.

// ── Remote throttling ───────────────────────────────────────────

/// Minimum spacing between accepted remote `element:drag` operations, in milliseconds.
pub const DRAG_THROTTLE_MS: u64 = 40;

/// Minimum spacing between accepted remote `text:update` operations, in milliseconds.
pub const TEXT_THROTTLE_MS: u64 = 300;

// ── Sync protocol ───────────────────────────────────────────────

/// Delay between connecting and announcing a `sync-request`, in milliseconds.
pub const JOIN_SETTLE_MS: u64 = 500;

/// How long a joiner waits for any `sync-response` before assuming it is alone.
pub const SYNC_RESPONSE_WINDOW_MS: u64 = 1500;

// ── History ─────────────────────────────────────────────────────

/// Maximum number of entries kept on the undo stack.
pub const HISTORY_LIMIT: usize = 100;

// ── Snapping ────────────────────────────────────────────────────

/// Search radius for anchor matches; a guide is shown for any match within it.
pub const SNAP_THRESHOLD: f64 = 10.0;

/// Distance at which a match actually overrides the coordinate.
pub const SNAP_ENGAGE: f64 = 5.0;

/// Default edge length of a spatial index cell, in canvas units.
pub const GRID_CELL_SIZE: f64 = 100.0;

/// Rotation snaps to multiples of this many degrees.
pub const ROTATION_STEP_DEG: f64 = 15.0;

/// Rotation snaps when within this many degrees of a step.
pub const ROTATION_SNAP_DEG: f64 = 3.0;

// ── Canvas defaults ─────────────────────────────────────────────

/// Default canvas width in canvas units.
pub const DEFAULT_CANVAS_WIDTH: f64 = 1080.0;

/// Default canvas height in canvas units.
pub const DEFAULT_CANVAS_HEIGHT: f64 = 1080.0;

/// Minimum width/height an element may be resized to.
pub const MIN_ELEMENT_SIZE: f64 = 1.0;
