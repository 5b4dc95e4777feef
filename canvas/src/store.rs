//! Store — the single owner of canvas state and local history.
//!
//! DESIGN
//! ======
//! Every mutation goes through `Store::apply`, which runs the operation
//! reducer. Collaborators read through accessors and learn about changes by
//! subscribing; there is no global singleton.
//!
//! Notifications fire only when something actually changed, after the
//! mutation is complete.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use crate::doc::{CanvasConfig, DocStore, Element, ElementId};
use crate::history::{Entry, History};
use crate::operation::{Action, Operation, apply_operation};

/// What kind of state a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Change {
    Elements,
    Canvas,
    Presence,
    History,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(Change) + Send>;

pub struct Store {
    doc: DocStore,
    history: History,
    selection: Vec<ElementId>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(History::default())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("elements", &self.doc.len())
            .field("undo_depth", &self.history.undo_depth())
            .field("redo_depth", &self.history.redo_depth())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl Store {
    #[must_use]
    pub fn new(history: History) -> Self {
        Self { doc: DocStore::new(), history, selection: Vec::new(), listeners: Vec::new(), next_subscription: 0 }
    }

    // --- Reads ---

    #[must_use]
    pub fn doc(&self) -> &DocStore {
        &self.doc
    }

    /// Elements in paint order.
    #[must_use]
    pub fn elements(&self) -> Vec<&Element> {
        self.doc.sorted_elements()
    }

    #[must_use]
    pub fn element(&self, id: &str) -> Option<&Element> {
        self.doc.get(id)
    }

    #[must_use]
    pub fn canvas(&self) -> &CanvasConfig {
        self.doc.canvas()
    }

    #[must_use]
    pub fn selection(&self) -> &[ElementId] {
        &self.selection
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.history.undo_depth()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.history.redo_depth()
    }

    // --- Subscriptions ---

    pub fn subscribe(&mut self, listener: impl FnMut(Change) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Fan `change` out to every listener.
    pub fn notify(&mut self, change: Change) {
        for (_, listener) in &mut self.listeners {
            listener(change);
        }
    }

    // --- Mutation ---

    /// Apply an operation through the reducer without touching history.
    pub fn apply(&mut self, op: &Operation) -> bool {
        let changed = apply_operation(&mut self.doc, op);
        if changed {
            if matches!(op.action, Action::CanvasRestore { .. }) {
                self.prune_selection();
                self.notify(Change::Elements);
                self.notify(Change::Canvas);
            } else {
                if matches!(op.action, Action::Remove { .. }) {
                    self.prune_selection();
                }
                self.notify(Change::Elements);
            }
        }
        changed
    }

    /// Apply a locally authored operation, recording it if it is undoable and took effect.
    pub fn apply_recorded(&mut self, op: &Operation) -> bool {
        let inverse = if op.is_undoable() { op.inverse(&self.doc) } else { None };
        self.apply_recorded_with_inverse(op, inverse)
    }

    /// Like `apply_recorded`, but with the inverse computed against `baseline`.
    ///
    /// Gesture commits use this: intermediate drag previews have already moved
    /// the element, so the inverse must come from the gesture's start state.
    pub fn apply_recorded_with_baseline(&mut self, op: &Operation, baseline: &DocStore) -> bool {
        let inverse = if op.is_undoable() { op.inverse(baseline) } else { None };
        self.apply_recorded_with_inverse(op, inverse)
    }

    fn apply_recorded_with_inverse(&mut self, op: &Operation, inverse: Option<Operation>) -> bool {
        let changed = self.apply(op);
        if changed && op.is_undoable() {
            self.history.record(op.clone(), inverse);
            self.notify(Change::History);
        }
        changed
    }

    /// Pop the latest entry and apply its inverse.
    ///
    /// Returns the applied inverse for broadcasting. An entry whose inverse is
    /// missing or whose target is gone is discarded and `None` is returned.
    pub fn undo(&mut self) -> Option<Operation> {
        let entry = self.history.pop_undo()?;
        let applied = match entry.inverse {
            Some(inverse) if inverse.targets_present(&self.doc) => {
                self.apply(&inverse);
                self.history.push_redo(entry.op);
                Some(inverse)
            }
            _ => {
                tracing::debug!(op = entry.op.kind(), "undo skipped: no applicable inverse");
                None
            }
        };
        self.notify(Change::History);
        applied
    }

    /// Pop the latest undone operation and re-apply it.
    ///
    /// Returns the re-applied operation for broadcasting.
    pub fn redo(&mut self) -> Option<Operation> {
        let op = self.history.pop_redo()?.restamped();
        let applied = if op.targets_present(&self.doc) {
            let inverse = op.inverse(&self.doc);
            self.apply(&op);
            self.history.push_undo(Entry { op: op.clone(), inverse });
            Some(op)
        } else {
            tracing::debug!(op = op.kind(), "redo skipped: target element is gone");
            None
        };
        self.notify(Change::History);
        applied
    }

    /// Destructively replace state with a full snapshot. Clears history,
    /// since recorded inverses refer to the discarded state.
    pub fn load_snapshot(&mut self, elements: Vec<Element>, canvas: CanvasConfig) {
        self.doc.load_snapshot(elements, canvas);
        self.history.clear();
        self.prune_selection();
        self.notify(Change::Elements);
        self.notify(Change::Canvas);
        self.notify(Change::History);
    }

    /// Replace the local selection. Unknown ids are dropped.
    pub fn set_selection(&mut self, ids: Vec<ElementId>) -> bool {
        let ids: Vec<ElementId> = ids.into_iter().filter(|id| self.doc.contains(id)).collect();
        if ids == self.selection {
            return false;
        }
        self.selection = ids;
        self.notify(Change::Presence);
        true
    }

    fn prune_selection(&mut self) {
        let doc = &self.doc;
        let before = self.selection.len();
        self.selection.retain(|id| doc.contains(id));
        if self.selection.len() != before {
            self.notify(Change::Presence);
        }
    }
}
