//! Spatial snap engine — alignment targets for interactive drag/resize.
//!
//! DESIGN
//! ======
//! Every element contributes six anchors (left, right, top, bottom, center-x,
//! center-y); the canvas contributes the same six for its own bounds. Anchors
//! are bucketed into a uniform hash grid so a query inspects only the cells
//! within `⌈radius / cell_size⌉` of the query point.
//!
//! Matching is two-tier: any same-axis anchor within `SNAP_THRESHOLD` produces
//! a guide, but the coordinate is only overridden within `SNAP_ENGAGE`.
//! The moving element's anchors are tried in the fixed order left, right,
//! top, bottom, center-x, center-y. The first engaging match per axis wins
//! and the search stops once both axes have snapped.
//!
//! The index is built at gesture start and dropped at gesture end. It is
//! never persisted or sent over the network.

#[cfg(test)]
#[path = "snap_test.rs"]
mod snap_test;

use rustc_hash::FxHashMap;

use crate::consts::{GRID_CELL_SIZE, ROTATION_SNAP_DEG, ROTATION_STEP_DEG, SNAP_ENGAGE, SNAP_THRESHOLD};
use crate::doc::{Bounds, Element, ElementId, normalize_rotation};

// =============================================================================
// ANCHORS
// =============================================================================

/// Which coordinate an anchor constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Vertical alignment line; compares x coordinates.
    X,
    /// Horizontal alignment line; compares y coordinates.
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorKind {
    Left,
    Right,
    Top,
    Bottom,
    CenterX,
    CenterY,
}

impl AnchorKind {
    /// Enumeration order used for matching.
    pub const ALL: [AnchorKind; 6] = [Self::Left, Self::Right, Self::Top, Self::Bottom, Self::CenterX, Self::CenterY];

    #[must_use]
    pub fn axis(self) -> Axis {
        match self {
            Self::Left | Self::Right | Self::CenterX => Axis::X,
            Self::Top | Self::Bottom | Self::CenterY => Axis::Y,
        }
    }

    /// The anchor's point on `bounds`.
    #[must_use]
    pub fn point(self, bounds: &Bounds) -> (f64, f64) {
        match self {
            Self::Left => (bounds.left(), bounds.center_y()),
            Self::Right => (bounds.right(), bounds.center_y()),
            Self::Top => (bounds.center_x(), bounds.top()),
            Self::Bottom => (bounds.center_x(), bounds.bottom()),
            Self::CenterX | Self::CenterY => (bounds.center_x(), bounds.center_y()),
        }
    }
}

/// A reference coordinate derived from an element or the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub kind: AnchorKind,
    pub x: f64,
    pub y: f64,
    /// Owning element; `None` for canvas anchors.
    pub source: Option<ElementId>,
}

impl Anchor {
    /// The coordinate this anchor constrains.
    #[must_use]
    pub fn position(&self) -> f64 {
        match self.kind.axis() {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }
}

fn anchors_of(bounds: &Bounds, source: Option<&ElementId>) -> impl Iterator<Item = Anchor> {
    let bounds = *bounds;
    let source = source.cloned();
    AnchorKind::ALL.into_iter().map(move |kind| {
        let (x, y) = kind.point(&bounds);
        Anchor { kind, x, y, source: source.clone() }
    })
}

// =============================================================================
// SPATIAL INDEX
// =============================================================================

/// Window half-width, in cells, beyond which a query scans the whole grid.
const MAX_REACH_CELLS: f64 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellKey(i64, i64);

/// Uniform hash grid of anchors, rebuilt per gesture.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: f64,
    cells: FxHashMap<CellKey, Vec<Anchor>>,
    len: usize,
}

impl SpatialIndex {
    /// Index every element not in `exclude`, plus the canvas bounds, with the default cell size.
    pub fn build<'a>(
        elements: impl IntoIterator<Item = &'a Element>,
        canvas_width: f64,
        canvas_height: f64,
        exclude: &[ElementId],
    ) -> Self {
        Self::build_with_cell_size(elements, canvas_width, canvas_height, exclude, GRID_CELL_SIZE)
    }

    pub fn build_with_cell_size<'a>(
        elements: impl IntoIterator<Item = &'a Element>,
        canvas_width: f64,
        canvas_height: f64,
        exclude: &[ElementId],
        cell_size: f64,
    ) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 { cell_size } else { GRID_CELL_SIZE };
        let mut index = Self { cell_size, cells: FxHashMap::default(), len: 0 };
        for anchor in anchors_of(&Bounds::new(0.0, 0.0, canvas_width, canvas_height), None) {
            index.insert(anchor);
        }
        for element in elements {
            if exclude.contains(&element.id) {
                continue;
            }
            for anchor in anchors_of(&element.bounds(), Some(&element.id)) {
                index.insert(anchor);
            }
        }
        index
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cell_of(&self, x: f64, y: f64) -> CellKey {
        CellKey((x / self.cell_size).floor() as i64, (y / self.cell_size).floor() as i64)
    }

    fn insert(&mut self, anchor: Anchor) {
        if !anchor.x.is_finite() || !anchor.y.is_finite() {
            return;
        }
        let key = self.cell_of(anchor.x, anchor.y);
        self.cells.entry(key).or_default().push(anchor);
        self.len += 1;
    }

    /// Total anchors indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Anchors in every cell within `⌈radius / cell_size⌉` cells of `(x, y)`.
    ///
    /// Order is deterministic: cells row by row, then insertion order. A reach
    /// wider than `MAX_REACH_CELLS` scans every occupied cell instead.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn nearby_anchors(&self, x: f64, y: f64, radius: f64) -> Vec<&Anchor> {
        if !x.is_finite() || !y.is_finite() {
            return Vec::new();
        }
        let reach = (radius.max(0.0) / self.cell_size).ceil();
        if !reach.is_finite() || reach > MAX_REACH_CELLS {
            return self.all_anchors();
        }
        let reach = reach as i64;
        let center = self.cell_of(x, y);
        let mut out = Vec::new();
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                // Cells past the i64 range do not exist; saturated centers skip them.
                let (Some(cx), Some(cy)) = (center.0.checked_add(dx), center.1.checked_add(dy)) else {
                    continue;
                };
                if let Some(anchors) = self.cells.get(&CellKey(cx, cy)) {
                    out.extend(anchors.iter());
                }
            }
        }
        out
    }

    fn all_anchors(&self) -> Vec<&Anchor> {
        let mut keys: Vec<&CellKey> = self.cells.keys().collect();
        keys.sort_by_key(|key| (key.1, key.0));
        keys.into_iter().filter_map(|key| self.cells.get(key)).flatten().collect()
    }

    /// Nearest anchor on `axis` whose constrained coordinate is within `radius` of the query.
    fn nearest_on_axis(&self, x: f64, y: f64, axis: Axis, radius: f64) -> Option<(&Anchor, f64)> {
        let target = match axis {
            Axis::X => x,
            Axis::Y => y,
        };
        let mut best: Option<(&Anchor, f64)> = None;
        for anchor in self.nearby_anchors(x, y, radius) {
            if anchor.kind.axis() != axis {
                continue;
            }
            let distance = (anchor.position() - target).abs();
            if distance > radius {
                continue;
            }
            if best.is_none_or(|(_, d)| distance < d) {
                best = Some((anchor, distance));
            }
        }
        best
    }
}

// =============================================================================
// SNAPPING
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// A line at constant x.
    Vertical,
    /// A line at constant y.
    Horizontal,
}

/// A visual alignment line for the UI to draw while a match is in range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Guide {
    pub orientation: Orientation,
    /// x for vertical guides, y for horizontal ones.
    pub position: f64,
    /// Extent along the line, spanning both matched anchors.
    pub start: f64,
    pub end: f64,
}

/// Outcome of `snap_position`. `x`/`y` are the new top-left coordinates when snapped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapResult {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub snapped_x: bool,
    pub snapped_y: bool,
    pub guides: Vec<Guide>,
}

/// Compute snap adjustments and guides for an element moving to `bounds`.
#[must_use]
pub fn snap_position(bounds: &Bounds, index: &SpatialIndex, disable: bool) -> SnapResult {
    let mut result = SnapResult::default();
    if disable {
        return result;
    }
    for kind in AnchorKind::ALL {
        if result.snapped_x && result.snapped_y {
            break;
        }
        let axis = kind.axis();
        let already = match axis {
            Axis::X => result.snapped_x,
            Axis::Y => result.snapped_y,
        };
        if already {
            continue;
        }
        let (ax, ay) = kind.point(bounds);
        let Some((target, distance)) = index.nearest_on_axis(ax, ay, axis, SNAP_THRESHOLD) else {
            continue;
        };
        result.guides.push(guide_between(axis, ax, ay, target));
        if distance <= SNAP_ENGAGE {
            match axis {
                Axis::X => {
                    result.x = Some(bounds.x + (target.x - ax));
                    result.snapped_x = true;
                }
                Axis::Y => {
                    result.y = Some(bounds.y + (target.y - ay));
                    result.snapped_y = true;
                }
            }
        }
    }
    result
}

/// Snap a single moving edge at `(x, y)` along `axis`, as used by resize handles.
///
/// Returns the snapped coordinate (if engaged) and the guide (if in range).
#[must_use]
pub fn snap_edge(x: f64, y: f64, axis: Axis, index: &SpatialIndex, disable: bool) -> (Option<f64>, Option<Guide>) {
    if disable {
        return (None, None);
    }
    let Some((target, distance)) = index.nearest_on_axis(x, y, axis, SNAP_THRESHOLD) else {
        return (None, None);
    };
    let snapped = (distance <= SNAP_ENGAGE).then(|| target.position());
    (snapped, Some(guide_between(axis, x, y, target)))
}

fn guide_between(axis: Axis, x: f64, y: f64, target: &Anchor) -> Guide {
    match axis {
        Axis::X => Guide {
            orientation: Orientation::Vertical,
            position: target.x,
            start: y.min(target.y),
            end: y.max(target.y),
        },
        Axis::Y => Guide {
            orientation: Orientation::Horizontal,
            position: target.y,
            start: x.min(target.x),
            end: x.max(target.x),
        },
    }
}

/// Snap an angle to the nearest `ROTATION_STEP_DEG` multiple when within `ROTATION_SNAP_DEG`.
///
/// Returns the snapped angle in `[0, 360)`, or `None` when no adjustment applies.
#[must_use]
pub fn snap_rotation(degrees: f64, disable: bool) -> Option<f64> {
    if disable || !degrees.is_finite() {
        return None;
    }
    let nearest = (degrees / ROTATION_STEP_DEG).round() * ROTATION_STEP_DEG;
    if (degrees - nearest).abs() <= ROTATION_SNAP_DEG {
        Some(normalize_rotation(nearest))
    } else {
        None
    }
}
