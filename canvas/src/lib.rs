//! Synchronization core for the collaborative canvas.
//!
//! This crate keeps several concurrent editors of one canvas consistent. It
//! owns the vocabulary of mutating operations and their inverses, the local
//! undo/redo history, the collaboration bridge that applies operations locally
//! and reconciles remote ones, advisory soft locks and presence, the
//! late-joiner bootstrap protocol, and the spatial snap engine used during
//! drag/resize. It performs no I/O: the host wires [`bridge::Bridge`] to a
//! broadcast transport and drains its outbound queue.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`doc`] | Elements, canvas configuration, and the in-memory document store |
//! | [`operation`] | Operation vocabulary, the reducer, and inverse computation |
//! | [`history`] | Linear undo/redo stacks |
//! | [`store`] | Store object: document + history + change subscribers |
//! | [`presence`] | Presence records, color palette, and soft-lock queries |
//! | [`throttle`] | Global rate limiting for inbound drag and text updates |
//! | [`protocol`] | JSON wire messages |
//! | [`sync`] | Late-joiner bootstrap state machine |
//! | [`bridge`] | Local-apply-then-broadcast and remote reconciliation |
//! | [`snap`] | Grid-indexed anchor search, snap offsets, and guides |
//! | [`gesture`] | Drag/resize/rotate gestures driving the snap engine |
//! | [`config`] | Environment-driven tuning knobs |
//! | [`consts`] | Shared numeric constants |

pub mod bridge;
pub mod config;
pub mod consts;
pub mod doc;
pub mod gesture;
pub mod history;
pub mod operation;
pub mod presence;
pub mod protocol;
pub mod snap;
pub mod store;
pub mod sync;
pub mod throttle;
