//! Interactive gestures: drag, resize, and rotate with snapping.
//!
//! A `Gesture` is the state tracked between pointer-down and pointer-up. It
//! owns the spatial index for its lifetime (built at start, dropped at
//! release) and a baseline copy of the element so the final commit can be
//! undone back to where the gesture began.
//!
//! Pointer moves produce transient operations (`element:drag` for moves, a
//! non-undoable `element:update` for resize/rotate previews). Release always
//! produces a terminal undoable `element:update`; there is no cancel-and-revert.

#[cfg(test)]
#[path = "gesture_test.rs"]
mod gesture_test;

use serde_json::{Value, json};

use crate::consts::MIN_ELEMENT_SIZE;
use crate::doc::{Bounds, DocStore, ElementId, Point, Updates, normalize_rotation};
use crate::operation::Action;
use crate::presence::is_locked_by_other;
use crate::snap::{Axis, Guide, SpatialIndex, snap_edge, snap_position, snap_rotation};

/// Modifier keys held during a pointer event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Constrain drags to the dominant axis.
    pub shift: bool,
    /// Disable snapping.
    pub alt: bool,
}

/// Resize handle on an element's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Handle {
    fn moves_left(self) -> bool {
        matches!(self, Self::West | Self::NorthWest | Self::SouthWest)
    }

    fn moves_right(self) -> bool {
        matches!(self, Self::East | Self::NorthEast | Self::SouthEast)
    }

    fn moves_top(self) -> bool {
        matches!(self, Self::North | Self::NorthEast | Self::NorthWest)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, Self::South | Self::SouthEast | Self::SouthWest)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GestureError {
    #[error("element {0} not found")]
    NotFound(ElementId),
    #[error("element {id} is locked by {owner}")]
    LockedByOther { id: ElementId, owner: String },
}

/// Output of a pointer move.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GestureStep {
    /// Transient operation to apply locally and broadcast.
    pub action: Option<Action>,
    /// Alignment guides to draw.
    pub guides: Vec<Guide>,
}

/// Terminal result of a gesture.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// Undoable `element:update` with the final geometry.
    pub action: Action,
    /// State at gesture start; undo is computed against it.
    pub baseline: DocStore,
}

/// Per-gesture state captured at pointer-down.
#[derive(Debug, Clone)]
pub struct Context {
    id: ElementId,
    start_pointer: Point,
    orig: Bounds,
    orig_rotation: f64,
    baseline: DocStore,
    index: SpatialIndex,
}

#[derive(Debug, Clone, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Dragging {
        ctx: Box<Context>,
        current: Point,
    },
    Resizing {
        ctx: Box<Context>,
        handle: Handle,
        current: Bounds,
    },
    Rotating {
        ctx: Box<Context>,
        center: Point,
        current: f64,
    },
}

impl Gesture {
    /// Start moving element `id` from `pointer`.
    pub fn begin_drag(doc: &DocStore, id: &str, self_id: &str, pointer: Point) -> Result<Self, GestureError> {
        let ctx = Context::new(doc, id, self_id, pointer)?;
        let current = Point::new(ctx.orig.x, ctx.orig.y);
        Ok(Self::Dragging { ctx: Box::new(ctx), current })
    }

    /// Start resizing element `id` by `handle`.
    pub fn begin_resize(
        doc: &DocStore,
        id: &str,
        self_id: &str,
        handle: Handle,
        pointer: Point,
    ) -> Result<Self, GestureError> {
        let ctx = Context::new(doc, id, self_id, pointer)?;
        let current = ctx.orig;
        Ok(Self::Resizing { ctx: Box::new(ctx), handle, current })
    }

    /// Start rotating element `id` about its center.
    pub fn begin_rotate(doc: &DocStore, id: &str, self_id: &str, pointer: Point) -> Result<Self, GestureError> {
        let ctx = Context::new(doc, id, self_id, pointer)?;
        let center = Point::new(ctx.orig.center_x(), ctx.orig.center_y());
        let current = ctx.orig_rotation;
        Ok(Self::Rotating { ctx: Box::new(ctx), center, current })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Id of the element under gesture, if any.
    #[must_use]
    pub fn element_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Dragging { ctx, .. } | Self::Resizing { ctx, .. } | Self::Rotating { ctx, .. } => Some(&ctx.id),
        }
    }

    /// Track the pointer. Returns the transient operation and current guides.
    pub fn pointer_move(&mut self, pointer: Point, modifiers: Modifiers) -> GestureStep {
        match self {
            Self::Idle => GestureStep::default(),
            Self::Dragging { ctx, current } => {
                let (mut dx, mut dy) = (pointer.x - ctx.start_pointer.x, pointer.y - ctx.start_pointer.y);
                if modifiers.shift {
                    if dx.abs() >= dy.abs() {
                        dy = 0.0;
                    } else {
                        dx = 0.0;
                    }
                }
                let moved = Bounds::new(ctx.orig.x + dx, ctx.orig.y + dy, ctx.orig.width, ctx.orig.height);
                let snap = snap_position(&moved, &ctx.index, modifiers.alt);
                *current = Point::new(snap.x.unwrap_or(moved.x), snap.y.unwrap_or(moved.y));
                GestureStep { action: Some(Action::drag(ctx.id.clone(), current.x, current.y)), guides: snap.guides }
            }
            Self::Resizing { ctx, handle, current } => {
                let (bounds, guides) = resize(ctx, *handle, pointer, modifiers.alt);
                *current = bounds;
                GestureStep { action: Some(preview(&ctx.id, geometry(&bounds))), guides }
            }
            Self::Rotating { ctx, center, current } => {
                let start = angle_deg(*center, ctx.start_pointer);
                let now = angle_deg(*center, pointer);
                let raw = normalize_rotation(ctx.orig_rotation + (now - start));
                *current = snap_rotation(raw, modifiers.alt).unwrap_or(raw);
                GestureStep { action: Some(preview(&ctx.id, rotation(*current))), guides: Vec::new() }
            }
        }
    }

    /// End the gesture, returning the terminal commit.
    ///
    /// `None` when idle or when the pointer never changed the element.
    #[must_use]
    pub fn release(self) -> Option<Commit> {
        let (ctx, updates) = match self {
            Self::Idle => return None,
            Self::Dragging { ctx, current } => {
                if current.x == ctx.orig.x && current.y == ctx.orig.y {
                    return None;
                }
                let updates = object([("x", json!(current.x)), ("y", json!(current.y))]);
                (ctx, updates)
            }
            Self::Resizing { ctx, current, .. } => {
                if current == ctx.orig {
                    return None;
                }
                (ctx, geometry(&current))
            }
            Self::Rotating { ctx, current, .. } => {
                if current == ctx.orig_rotation {
                    return None;
                }
                (ctx, rotation(current))
            }
        };
        let ctx = *ctx;
        Some(Commit { action: Action::update(ctx.id, updates), baseline: ctx.baseline })
    }
}

impl Context {
    fn new(doc: &DocStore, id: &str, self_id: &str, pointer: Point) -> Result<Self, GestureError> {
        let element = doc.get(id).ok_or_else(|| GestureError::NotFound(id.to_owned()))?;
        if is_locked_by_other(element, self_id) {
            return Err(GestureError::LockedByOther {
                id: id.to_owned(),
                owner: element.locked_by_name.clone().or_else(|| element.locked_by.clone()).unwrap_or_default(),
            });
        }
        let mut baseline = DocStore::with_canvas(doc.canvas().clone());
        baseline.insert(element.clone());
        let canvas = doc.canvas();
        let exclude = [element.id.clone()];
        let index = SpatialIndex::build(doc.sorted_elements(), canvas.width, canvas.height, &exclude);
        Ok(Self {
            id: element.id.clone(),
            start_pointer: pointer,
            orig: element.bounds(),
            orig_rotation: element.rotation,
            baseline,
            index,
        })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn resize(ctx: &Context, handle: Handle, pointer: Point, disable_snap: bool) -> (Bounds, Vec<Guide>) {
    let dx = pointer.x - ctx.start_pointer.x;
    let dy = pointer.y - ctx.start_pointer.y;
    let orig = ctx.orig;
    let mut guides = Vec::new();

    let (mut left, mut right, mut top, mut bottom) = (orig.left(), orig.right(), orig.top(), orig.bottom());
    let mid_y = orig.center_y();
    let mid_x = orig.center_x();

    if handle.moves_left() {
        left = snap_into(orig.left() + dx, mid_y, Axis::X, ctx, disable_snap, &mut guides);
        left = left.min(right - MIN_ELEMENT_SIZE);
    }
    if handle.moves_right() {
        right = snap_into(orig.right() + dx, mid_y, Axis::X, ctx, disable_snap, &mut guides);
        right = right.max(left + MIN_ELEMENT_SIZE);
    }
    if handle.moves_top() {
        top = snap_into(orig.top() + dy, mid_x, Axis::Y, ctx, disable_snap, &mut guides);
        top = top.min(bottom - MIN_ELEMENT_SIZE);
    }
    if handle.moves_bottom() {
        bottom = snap_into(orig.bottom() + dy, mid_x, Axis::Y, ctx, disable_snap, &mut guides);
        bottom = bottom.max(top + MIN_ELEMENT_SIZE);
    }
    (Bounds::new(left, top, right - left, bottom - top), guides)
}

/// Snap a moving edge. `along` is the edge's coordinate on the other axis.
fn snap_into(value: f64, along: f64, axis: Axis, ctx: &Context, disable: bool, guides: &mut Vec<Guide>) -> f64 {
    let (x, y) = match axis {
        Axis::X => (value, along),
        Axis::Y => (along, value),
    };
    let (snapped, guide) = snap_edge(x, y, axis, &ctx.index, disable);
    guides.extend(guide);
    snapped.unwrap_or(value)
}

fn angle_deg(center: Point, p: Point) -> f64 {
    (p.y - center.y).atan2(p.x - center.x).to_degrees()
}

fn object<const N: usize>(pairs: [(&str, Value); N]) -> Updates {
    pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
}

fn geometry(b: &Bounds) -> Updates {
    object([("x", json!(b.x)), ("y", json!(b.y)), ("width", json!(b.width)), ("height", json!(b.height))])
}

fn rotation(degrees: f64) -> Updates {
    object([("rotation", json!(degrees))])
}

fn preview(id: &str, updates: Updates) -> Action {
    Action::Update { element_id: id.to_owned(), updates, undoable: false }
}
