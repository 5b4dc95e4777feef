//! Document model: canvas elements, canvas configuration, and the in-memory store.
//!
//! This module defines what is on the canvas (`Element` with its typed
//! `Payload`), the canvas itself (`CanvasConfig`), and the store that owns all
//! live elements (`DocStore`).
//!
//! The generic update path (`DocStore::merge`) treats elements opaquely: an
//! update is a flat map of camelCase keys, merged over the element's JSON
//! form and re-validated. Only the named keys change; `null` deletes an
//! optional key; `id` and `type` are never rewritten. Keys that are not part
//! of the element's schema are dropped on re-validation.

#[cfg(test)]
#[path = "doc_test.rs"]
mod doc_test;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::consts::{DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH};

/// Stable opaque identifier of an element, unique within a canvas.
pub type ElementId = String;

/// Identifier of an authoring user.
pub type UserId = String;

/// Sparse element update keyed by wire field name.
pub type Updates = Map<String, Value>;

/// Keys the generic update path never rewrites.
const PROTECTED_KEYS: [&str; 2] = ["id", "type"];

// =============================================================================
// GEOMETRY
// =============================================================================

/// A point in canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounds in canvas units (top-left origin).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    #[must_use]
    pub fn left(&self) -> f64 {
        self.x
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn top(&self) -> f64 {
        self.y
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[must_use]
    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    #[must_use]
    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }
}

/// Normalize an angle in degrees into `[0, 360)`. Non-finite input maps to 0.
#[must_use]
pub fn normalize_rotation(degrees: f64) -> f64 {
    let r = degrees.rem_euclid(360.0);
    if r.is_finite() && r < 360.0 { r } else { 0.0 }
}

// =============================================================================
// ELEMENT
// =============================================================================

/// A positioned, typed visual object on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    /// Unique identifier within the canvas.
    pub id: ElementId,
    /// Left edge in canvas units.
    pub x: f64,
    /// Top edge in canvas units.
    pub y: f64,
    /// Width in canvas units.
    pub width: f64,
    /// Height in canvas units.
    pub height: f64,
    /// Clockwise rotation in degrees, normalized to `[0, 360)`.
    #[serde(default)]
    pub rotation: f64,
    /// Paint order; higher values draw above lower ones. Need not be contiguous.
    #[serde(default)]
    pub z_index: i64,
    /// User currently holding the soft lock, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<UserId>,
    /// Display name of the lock holder, denormalized for the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_by_name: Option<String>,
    /// Type-specific content, tagged by `type` on the wire.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Element {
    /// Create an unlocked element with a fresh random id.
    #[must_use]
    pub fn new(payload: Payload, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), payload, x, y, width, height)
    }

    /// Create an unlocked element with an explicit id.
    #[must_use]
    pub fn with_id(id: impl Into<ElementId>, payload: Payload, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width,
            height,
            rotation: 0.0,
            z_index: 0,
            locked_by: None,
            locked_by_name: None,
            payload,
        }
    }

    #[must_use]
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.x, self.y, self.width, self.height)
    }

    /// Whether any user holds the soft lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked_by.is_some()
    }
}

/// Type-specific element content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    Text(TextPayload),
    Image(ImagePayload),
    Shape(ShapePayload),
    Icon(IconPayload),
    Path(PathPayload),
    Video(VideoPayload),
}

impl Payload {
    /// A text payload with default styling.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextPayload { text: text.into(), ..TextPayload::default() })
    }

    /// A filled shape payload.
    #[must_use]
    pub fn shape(shape: ShapeKind, fill: impl Into<String>) -> Self {
        Self::Shape(ShapePayload { shape, fill: Some(fill.into()), ..ShapePayload::default() })
    }

    /// An image payload pointing at `src`.
    #[must_use]
    pub fn image(src: impl Into<String>) -> Self {
        Self::Image(ImagePayload { src: src.into(), ..ImagePayload::default() })
    }

    /// The wire discriminant for this payload.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Shape(_) => "shape",
            Self::Icon(_) => "icon",
            Self::Path(_) => "path",
            Self::Video(_) => "video",
        }
    }
}

/// Rich-text block content. Rendering lives outside the core.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPayload {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<String>,
}

/// Geometric primitive drawn by a shape element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    #[default]
    Rect,
    Ellipse,
    Triangle,
    Star,
    Line,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapePayload {
    #[serde(default)]
    pub shape: ShapeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IconPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

/// Freehand or vector path, stored as SVG path data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathPayload {
    pub d: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPayload {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(default)]
    pub autoplay: bool,
    #[serde(default)]
    pub muted: bool,
}

// =============================================================================
// CANVAS CONFIGURATION
// =============================================================================

/// Canvas dimensions and background. Always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasConfig {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub background: Background,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self { width: DEFAULT_CANVAS_WIDTH, height: DEFAULT_CANVAS_HEIGHT, background: Background::default() }
    }
}

/// Canvas background description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Background {
    Color { color: String },
    Gradient {
        from: String,
        to: String,
        #[serde(default)]
        angle: f64,
    },
    Image { src: String },
}

impl Default for Background {
    fn default() -> Self {
        Self::Color { color: "#ffffff".to_owned() }
    }
}

// =============================================================================
// DOC STORE
// =============================================================================

/// In-memory store of canvas elements plus the canvas configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocStore {
    elements: HashMap<ElementId, Element>,
    canvas: CanvasConfig,
}

impl DocStore {
    /// Create an empty store with the default canvas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given canvas configuration.
    #[must_use]
    pub fn with_canvas(canvas: CanvasConfig) -> Self {
        Self { elements: HashMap::new(), canvas }
    }

    /// Insert or replace an element. An element with the same `id` is overwritten.
    pub fn insert(&mut self, element: Element) {
        self.elements.insert(element.id.clone(), element);
    }

    /// Remove an element by id, returning it if it was present.
    pub fn remove(&mut self, id: &str) -> Option<Element> {
        self.elements.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.elements.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    /// Merge a sparse update into an existing element.
    ///
    /// Returns `false` if the element does not exist, if the merged result is
    /// not a valid element, or if nothing changed.
    pub fn merge(&mut self, id: &str, updates: &Updates) -> bool {
        let Some(current) = self.elements.get(id) else {
            return false;
        };
        let Some(merged) = merged_element(current, updates) else {
            return false;
        };
        if &merged == current {
            return false;
        }
        self.elements.insert(merged.id.clone(), merged);
        true
    }

    #[must_use]
    pub fn canvas(&self) -> &CanvasConfig {
        &self.canvas
    }

    /// Replace the canvas configuration wholesale.
    pub fn set_canvas(&mut self, canvas: CanvasConfig) {
        self.canvas = canvas;
    }

    /// Replace every element and the canvas with a full snapshot.
    pub fn load_snapshot(&mut self, elements: Vec<Element>, canvas: CanvasConfig) {
        self.elements.clear();
        for element in elements {
            self.elements.insert(element.id.clone(), element);
        }
        self.canvas = canvas;
    }

    /// Return all elements sorted by `(z_index, id)` for paint order.
    #[must_use]
    pub fn sorted_elements(&self) -> Vec<&Element> {
        let mut elements: Vec<&Element> = self.elements.values().collect();
        elements.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        elements
    }

    /// Owned copy of all elements in paint order, as carried by sync payloads.
    #[must_use]
    pub fn snapshot_elements(&self) -> Vec<Element> {
        self.sorted_elements().into_iter().cloned().collect()
    }

    /// Number of elements currently in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the store contains no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Merge `updates` over `element`'s wire form and re-validate the result.
///
/// Returns `None` when the merged form is not a valid element (for example a
/// required key was nulled or given the wrong type).
#[must_use]
pub fn merged_element(element: &Element, updates: &Updates) -> Option<Element> {
    let Ok(Value::Object(mut fields)) = serde_json::to_value(element) else {
        return None;
    };
    for (key, value) in updates {
        if PROTECTED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if value.is_null() {
            fields.remove(key);
        } else {
            fields.insert(key.clone(), value.clone());
        }
    }
    match serde_json::from_value::<Element>(Value::Object(fields)) {
        Ok(mut merged) => {
            merged.rotation = normalize_rotation(merged.rotation);
            Some(merged)
        }
        Err(err) => {
            tracing::debug!(element_id = %element.id, error = %err, "rejected element update");
            None
        }
    }
}

/// Current wire values of `keys` on `element`; absent keys map to `null`.
#[must_use]
pub fn field_values(element: &Element, keys: impl IntoIterator<Item = impl AsRef<str>>) -> Updates {
    let fields = match serde_json::to_value(element) {
        Ok(Value::Object(fields)) => fields,
        _ => Map::new(),
    };
    keys.into_iter()
        .map(|key| {
            let key = key.as_ref();
            (key.to_owned(), fields.get(key).cloned().unwrap_or(Value::Null))
        })
        .collect()
}
