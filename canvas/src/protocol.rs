//! Wire protocol — every JSON message that crosses the broadcast channel.
//!
//! DESIGN
//! ======
//! Messages are flat JSON objects discriminated by a string `type`:
//! - canvas operations (`element:*`, `text:*`, `canvas:restore`)
//! - sync control (`sync-request`, `sync-response`, `full-sync`)
//! - ambient presence (`presence:update`, `presence:leave`)
//! - relay session handshake (`session:connected`)
//!
//! There is no framing, versioning, or negotiation. Both ends run the same build.
//!
//! ERROR HANDLING
//! ==============
//! `decode` classifies failures so callers can log precisely, but callers are
//! expected to drop bad messages rather than propagate them.

#[cfg(test)]
#[path = "protocol_test.rs"]
mod protocol_test;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::doc::{CanvasConfig, Element};
use crate::operation::Operation;
use crate::presence::{ConnectionId, PresenceRecord};

/// Every `type` string that identifies a canvas operation.
pub const OPERATION_TYPES: [&str; 11] = [
    "element:update",
    "element:add",
    "element:remove",
    "element:lock",
    "element:unlock",
    "element:drag",
    "text:start",
    "text:update",
    "text:commit",
    "element:z-index",
    "canvas:restore",
];

// =============================================================================
// MESSAGES
// =============================================================================

/// Late-joiner bootstrap and forced resync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncMessage {
    #[serde(rename = "sync-request", rename_all = "camelCase")]
    Request { requester_id: ConnectionId },
    #[serde(rename = "sync-response", rename_all = "camelCase")]
    Response { requester_id: ConnectionId, elements: Vec<Element>, canvas: CanvasConfig },
    #[serde(rename = "full-sync", rename_all = "camelCase")]
    FullSync { sender_id: ConnectionId, elements: Vec<Element>, canvas: CanvasConfig },
}

/// Ambient cursor/selection channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PresenceMessage {
    #[serde(rename = "presence:update")]
    Update(PresenceRecord),
    #[serde(rename = "presence:leave", rename_all = "camelCase")]
    Leave { connection_id: ConnectionId },
}

/// Messages originated by the relay itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionMessage {
    #[serde(rename = "session:connected", rename_all = "camelCase")]
    Connected { connection_id: ConnectionId },
}

/// Any message on the channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    Operation(Operation),
    Sync(SyncMessage),
    Presence(PresenceMessage),
    Session(SessionMessage),
}

impl From<Operation> for Message {
    fn from(op: Operation) -> Self {
        Self::Operation(op)
    }
}

impl From<SyncMessage> for Message {
    fn from(msg: SyncMessage) -> Self {
        Self::Sync(msg)
    }
}

impl From<PresenceMessage> for Message {
    fn from(msg: PresenceMessage) -> Self {
        Self::Presence(msg)
    }
}

impl From<SessionMessage> for Message {
    fn from(msg: SessionMessage) -> Self {
        Self::Session(msg)
    }
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not an object with a string `type`")]
    MissingType,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("invalid `{kind}` message: {source}")]
    Invalid { kind: String, source: serde_json::Error },
}

// =============================================================================
// CODEC
// =============================================================================

/// Serialize a message to its JSON text form.
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a JSON text frame into a typed message.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    decode_value(value)
}

/// Classify and parse an already-parsed JSON value.
pub fn decode_value(value: Value) -> Result<Message, ProtocolError> {
    let kind = message_type(&value).ok_or(ProtocolError::MissingType)?.to_owned();
    let invalid = |source| ProtocolError::Invalid { kind: kind.clone(), source };
    let message = match kind.as_str() {
        "sync-request" | "sync-response" | "full-sync" => {
            Message::Sync(serde_json::from_value(value).map_err(invalid)?)
        }
        "presence:update" | "presence:leave" => Message::Presence(serde_json::from_value(value).map_err(invalid)?),
        "session:connected" => Message::Session(serde_json::from_value(value).map_err(invalid)?),
        k if OPERATION_TYPES.contains(&k) => Message::Operation(serde_json::from_value(value).map_err(invalid)?),
        _ => return Err(ProtocolError::UnknownType(kind.clone())),
    };
    Ok(message)
}

/// The string `type` of a JSON object, if it has one.
#[must_use]
pub fn message_type(value: &Value) -> Option<&str> {
    value.as_object()?.get("type")?.as_str()
}
