//! Undo/redo stacks.
//!
//! Linear history: recording a new entry clears the redo stack. Entries pair
//! the operation with the inverse computed when it was applied. History is
//! local to one client and never sent over the network.

#[cfg(test)]
#[path = "history_test.rs"]
mod history_test;

use std::collections::VecDeque;

use crate::consts::HISTORY_LIMIT;
use crate::operation::Operation;

/// One undoable step: what was done, and how to take it back.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub op: Operation,
    /// `None` when the inverse could not be computed; undoing such an entry is a no-op.
    pub inverse: Option<Operation>,
}

#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<Entry>,
    redo: Vec<Operation>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}

impl History {
    /// Create empty stacks holding at most `limit` undo entries.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { undo: VecDeque::new(), redo: Vec::new(), limit: limit.max(1) }
    }

    /// Record a freshly applied operation. Clears the redo stack.
    pub fn record(&mut self, op: Operation, inverse: Option<Operation>) {
        self.redo.clear();
        self.push_undo(Entry { op, inverse });
    }

    /// Push onto the undo stack without touching redo (used by redo).
    pub fn push_undo(&mut self, entry: Entry) {
        self.undo.push_back(entry);
        while self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    pub fn pop_undo(&mut self) -> Option<Entry> {
        self.undo.pop_back()
    }

    pub fn push_redo(&mut self, op: Operation) {
        self.redo.push(op);
    }

    pub fn pop_redo(&mut self) -> Option<Operation> {
        self.redo.pop()
    }

    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
