//! Operation model — the closed vocabulary of canvas mutations.
//!
//! DESIGN
//! ======
//! An `Operation` is self-describing: author, author-local timestamp, and a
//! tagged `Action`. `apply_operation` is the only code path that mutates a
//! `DocStore` on behalf of a user, local or remote.
//!
//! Inverses are computed against the document *before* the operation is
//! applied, so an `element:update` inverse carries exactly the prior values of
//! the keys it touched.
//!
//! ERROR HANDLING
//! ==============
//! Operations that reference a missing element are no-ops and report `false`.
//! Nothing here returns an error; malformed input is rejected at decode time.

#[cfg(test)]
#[path = "operation_test.rs"]
mod operation_test;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::doc::{CanvasConfig, DocStore, Element, ElementId, Payload, Updates, UserId, field_values, normalize_rotation};

// =============================================================================
// TYPES
// =============================================================================

/// A single mutating action with its author and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Author of the operation.
    pub user_id: UserId,
    /// Milliseconds since Unix epoch on the author's clock. Informational only.
    pub ts: i64,
    #[serde(flatten)]
    pub action: Action,
}

/// Mutation variants, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    #[serde(rename = "element:update", rename_all = "camelCase")]
    Update {
        element_id: ElementId,
        updates: Updates,
        #[serde(default)]
        undoable: bool,
    },
    #[serde(rename = "element:add")]
    Add {
        element: Element,
        #[serde(default)]
        undoable: bool,
    },
    #[serde(rename = "element:remove", rename_all = "camelCase")]
    Remove {
        element_id: ElementId,
        removed_element: Element,
        #[serde(default)]
        undoable: bool,
    },
    #[serde(rename = "element:lock", rename_all = "camelCase")]
    Lock { element_id: ElementId, user_name: String },
    #[serde(rename = "element:unlock", rename_all = "camelCase")]
    Unlock { element_id: ElementId },
    #[serde(rename = "element:drag", rename_all = "camelCase")]
    Drag { element_id: ElementId, x: f64, y: f64 },
    #[serde(rename = "text:start", rename_all = "camelCase")]
    TextStart { element_id: ElementId, user_name: String },
    #[serde(rename = "text:update", rename_all = "camelCase")]
    TextUpdate { element_id: ElementId, text: String },
    #[serde(rename = "text:commit", rename_all = "camelCase")]
    TextCommit { element_id: ElementId, text: String },
    #[serde(rename = "element:z-index", rename_all = "camelCase")]
    ZIndex {
        element_id: ElementId,
        z_index: i64,
        #[serde(default)]
        undoable: bool,
    },
    #[serde(rename = "canvas:restore")]
    CanvasRestore { elements: Vec<Element>, canvas: CanvasConfig },
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Operation {
    /// Stamp `action` with its author and the current time.
    pub fn new(user_id: impl Into<UserId>, action: Action) -> Self {
        Self { user_id: user_id.into(), ts: now_ms(), action }
    }

    /// Wire discriminant, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.action.kind()
    }

    /// Whether this operation belongs on the undo stack.
    #[must_use]
    pub fn is_undoable(&self) -> bool {
        match &self.action {
            Action::Update { undoable, .. }
            | Action::Add { undoable, .. }
            | Action::Remove { undoable, .. }
            | Action::ZIndex { undoable, .. } => *undoable,
            _ => false,
        }
    }

    /// The element this operation targets, if it targets exactly one.
    #[must_use]
    pub fn element_id(&self) -> Option<&str> {
        match &self.action {
            Action::Update { element_id, .. }
            | Action::Remove { element_id, .. }
            | Action::Lock { element_id, .. }
            | Action::Unlock { element_id }
            | Action::Drag { element_id, .. }
            | Action::TextStart { element_id, .. }
            | Action::TextUpdate { element_id, .. }
            | Action::TextCommit { element_id, .. }
            | Action::ZIndex { element_id, .. } => Some(element_id),
            Action::Add { element, .. } => Some(&element.id),
            Action::CanvasRestore { .. } => None,
        }
    }

    /// Whether applying this operation to `doc` can have any effect.
    ///
    /// Operations on an existing element require it to still be present.
    /// Adds and restores always apply.
    #[must_use]
    pub fn targets_present(&self, doc: &DocStore) -> bool {
        match &self.action {
            Action::Add { .. } | Action::CanvasRestore { .. } => true,
            _ => self.element_id().is_some_and(|id| doc.contains(id)),
        }
    }

    /// Compute the operation that undoes `self`, given the document before `self` is applied.
    ///
    /// Returns `None` for variants without an inverse and when the target
    /// element is missing from `before`.
    #[must_use]
    pub fn inverse(&self, before: &DocStore) -> Option<Operation> {
        let action = match &self.action {
            Action::Update { element_id, updates, undoable } => {
                let element = before.get(element_id)?;
                let prior = field_values(element, updates.keys().filter(|key| !matches!(key.as_str(), "id" | "type")));
                Action::Update { element_id: element_id.clone(), updates: prior, undoable: *undoable }
            }
            Action::Add { element, undoable } => Action::Remove {
                element_id: element.id.clone(),
                removed_element: element.clone(),
                undoable: *undoable,
            },
            Action::Remove { element_id, removed_element, undoable } => {
                let element = before.get(element_id).unwrap_or(removed_element);
                Action::Add { element: element.clone(), undoable: *undoable }
            }
            Action::ZIndex { element_id, undoable, .. } => {
                let element = before.get(element_id)?;
                Action::ZIndex { element_id: element_id.clone(), z_index: element.z_index, undoable: *undoable }
            }
            Action::Lock { .. }
            | Action::Unlock { .. }
            | Action::Drag { .. }
            | Action::TextStart { .. }
            | Action::TextUpdate { .. }
            | Action::TextCommit { .. }
            | Action::CanvasRestore { .. } => return None,
        };
        Some(Operation::new(self.user_id.clone(), action))
    }

    /// Return a copy with a fresh timestamp, used when redoing.
    #[must_use]
    pub fn restamped(&self) -> Self {
        Self { ts: now_ms(), ..self.clone() }
    }
}

impl Action {
    /// Undoable sparse update of an element's fields.
    #[must_use]
    pub fn update(element_id: impl Into<ElementId>, updates: Updates) -> Self {
        Self::Update { element_id: element_id.into(), updates, undoable: true }
    }

    /// Undoable insertion of a new element.
    #[must_use]
    pub fn add(element: Element) -> Self {
        Self::Add { element, undoable: true }
    }

    /// Undoable removal; the removed element travels with the operation.
    #[must_use]
    pub fn remove(removed_element: Element) -> Self {
        Self::Remove { element_id: removed_element.id.clone(), removed_element, undoable: true }
    }

    #[must_use]
    pub fn lock(element_id: impl Into<ElementId>, user_name: impl Into<String>) -> Self {
        Self::Lock { element_id: element_id.into(), user_name: user_name.into() }
    }

    #[must_use]
    pub fn unlock(element_id: impl Into<ElementId>) -> Self {
        Self::Unlock { element_id: element_id.into() }
    }

    #[must_use]
    pub fn drag(element_id: impl Into<ElementId>, x: f64, y: f64) -> Self {
        Self::Drag { element_id: element_id.into(), x, y }
    }

    #[must_use]
    pub fn text_start(element_id: impl Into<ElementId>, user_name: impl Into<String>) -> Self {
        Self::TextStart { element_id: element_id.into(), user_name: user_name.into() }
    }

    #[must_use]
    pub fn text_update(element_id: impl Into<ElementId>, text: impl Into<String>) -> Self {
        Self::TextUpdate { element_id: element_id.into(), text: text.into() }
    }

    #[must_use]
    pub fn text_commit(element_id: impl Into<ElementId>, text: impl Into<String>) -> Self {
        Self::TextCommit { element_id: element_id.into(), text: text.into() }
    }

    /// Undoable paint-order change.
    #[must_use]
    pub fn z_index(element_id: impl Into<ElementId>, z_index: i64) -> Self {
        Self::ZIndex { element_id: element_id.into(), z_index, undoable: true }
    }

    #[must_use]
    pub fn canvas_restore(elements: Vec<Element>, canvas: CanvasConfig) -> Self {
        Self::CanvasRestore { elements, canvas }
    }

    /// Wire discriminant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Update { .. } => "element:update",
            Self::Add { .. } => "element:add",
            Self::Remove { .. } => "element:remove",
            Self::Lock { .. } => "element:lock",
            Self::Unlock { .. } => "element:unlock",
            Self::Drag { .. } => "element:drag",
            Self::TextStart { .. } => "text:start",
            Self::TextUpdate { .. } => "text:update",
            Self::TextCommit { .. } => "text:commit",
            Self::ZIndex { .. } => "element:z-index",
            Self::CanvasRestore { .. } => "canvas:restore",
        }
    }
}

// =============================================================================
// REDUCER
// =============================================================================

/// Apply `op` to `doc`. Returns whether anything changed.
pub fn apply_operation(doc: &mut DocStore, op: &Operation) -> bool {
    match &op.action {
        Action::Update { element_id, updates, .. } => doc.merge(element_id, updates),
        Action::Add { element, .. } => {
            let mut element = element.clone();
            element.rotation = normalize_rotation(element.rotation);
            if doc.get(&element.id) == Some(&element) {
                return false;
            }
            doc.insert(element);
            true
        }
        Action::Remove { element_id, .. } => doc.remove(element_id).is_some(),
        Action::Lock { element_id, user_name } => {
            let Some(element) = doc.get_mut(element_id) else {
                return false;
            };
            set_lock(element, Some((&op.user_id, user_name)))
        }
        Action::Unlock { element_id } => {
            let Some(element) = doc.get_mut(element_id) else {
                return false;
            };
            set_lock(element, None)
        }
        Action::Drag { element_id, x, y } => {
            let Some(element) = doc.get_mut(element_id) else {
                return false;
            };
            if element.x == *x && element.y == *y {
                return false;
            }
            element.x = *x;
            element.y = *y;
            true
        }
        Action::TextStart { element_id, user_name } => {
            let Some(element) = doc.get_mut(element_id) else {
                return false;
            };
            if !matches!(element.payload, Payload::Text(_)) {
                return false;
            }
            set_lock(element, Some((&op.user_id, user_name)))
        }
        Action::TextUpdate { element_id, text } => {
            let Some(element) = doc.get_mut(element_id) else {
                return false;
            };
            set_text(element, text)
        }
        Action::TextCommit { element_id, text } => {
            let Some(element) = doc.get_mut(element_id) else {
                return false;
            };
            if !matches!(element.payload, Payload::Text(_)) {
                return false;
            }
            let wrote = set_text(element, text);
            let released = element.locked_by.as_deref() == Some(op.user_id.as_str()) && set_lock(element, None);
            wrote || released
        }
        Action::ZIndex { element_id, z_index, .. } => {
            let Some(element) = doc.get_mut(element_id) else {
                return false;
            };
            if element.z_index == *z_index {
                return false;
            }
            element.z_index = *z_index;
            true
        }
        Action::CanvasRestore { elements, canvas } => {
            doc.load_snapshot(elements.clone(), canvas.clone());
            true
        }
    }
}

fn set_lock(element: &mut Element, holder: Option<(&UserId, &String)>) -> bool {
    let (locked_by, locked_by_name) = match holder {
        Some((user_id, name)) => (Some(user_id.clone()), Some(name.clone())),
        None => (None, None),
    };
    if element.locked_by == locked_by && element.locked_by_name == locked_by_name {
        return false;
    }
    element.locked_by = locked_by;
    element.locked_by_name = locked_by_name;
    true
}

fn set_text(element: &mut Element, text: &str) -> bool {
    let Payload::Text(payload) = &mut element.payload else {
        return false;
    };
    if payload.text == text {
        return false;
    }
    text.clone_into(&mut payload.text);
    true
}
