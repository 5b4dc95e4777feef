use serde_json::json;

use super::*;
use crate::doc::Payload;
use crate::operation::Action;
use crate::presence::Role;

fn element(id: &str) -> Element {
    Element::with_id(id, Payload::text("hi"), 0.0, 0.0, 10.0, 10.0)
}

#[test]
fn decodes_operation() {
    let msg = decode(r#"{"type":"element:drag","userId":"u1","ts":5,"elementId":"e1","x":1,"y":2}"#).unwrap();
    let Message::Operation(op) = msg else {
        panic!("expected operation, got {msg:?}");
    };
    assert_eq!(op.user_id, "u1");
    assert_eq!(op.action, Action::drag("e1", 1.0, 2.0));
}

#[test]
fn decodes_sync_request() {
    let msg = decode(r#"{"type":"sync-request","requesterId":"c9"}"#).unwrap();
    assert_eq!(msg, Message::Sync(SyncMessage::Request { requester_id: "c9".into() }));
}

#[test]
fn sync_response_wire_shape() {
    let msg = Message::from(SyncMessage::Response {
        requester_id: "c1".into(),
        elements: vec![element("a")],
        canvas: CanvasConfig::default(),
    });
    let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();
    assert_eq!(value["type"], "sync-response");
    assert_eq!(value["requesterId"], "c1");
    assert_eq!(value["elements"][0]["id"], "a");
    assert_eq!(value["canvas"]["width"], 1080.0);
}

#[test]
fn full_sync_carries_sender() {
    let msg = decode(r#"{"type":"full-sync","senderId":"c2","elements":[],"canvas":{"width":5,"height":5}}"#).unwrap();
    let Message::Sync(SyncMessage::FullSync { sender_id, elements, canvas }) = msg else {
        panic!("expected full-sync");
    };
    assert_eq!(sender_id, "c2");
    assert!(elements.is_empty());
    assert_eq!(canvas.width, 5.0);
}

#[test]
fn presence_update_is_flat() {
    let msg = Message::from(PresenceMessage::Update(PresenceRecord {
        connection_id: "c1".into(),
        user_id: "u1".into(),
        name: "Ada".into(),
        color: "#fff".into(),
        role: Role::Owner,
        cursor: None,
        selection: vec![],
    }));
    let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();
    assert_eq!(value["type"], "presence:update");
    assert_eq!(value["connectionId"], "c1");
    assert_eq!(value["role"], "owner");
    assert_eq!(decode(&value.to_string()).unwrap(), msg);
}

#[test]
fn decodes_presence_leave_and_session() {
    assert_eq!(
        decode(r#"{"type":"presence:leave","connectionId":"c3"}"#).unwrap(),
        Message::Presence(PresenceMessage::Leave { connection_id: "c3".into() })
    );
    assert_eq!(
        decode(r#"{"type":"session:connected","connectionId":"c4"}"#).unwrap(),
        Message::Session(SessionMessage::Connected { connection_id: "c4".into() })
    );
}

#[test]
fn operation_encodes_flat() {
    let op = Operation::new("u1", Action::add(element("a")));
    let value: Value = serde_json::from_str(&encode(&Message::from(op.clone())).unwrap()).unwrap();
    assert_eq!(value["type"], "element:add");
    assert_eq!(value["element"]["type"], "text");
    assert_eq!(decode(&value.to_string()).unwrap(), Message::Operation(op));
}

#[test]
fn rejects_non_json() {
    assert!(matches!(decode("{not json"), Err(ProtocolError::Json(_))));
}

#[test]
fn rejects_missing_type() {
    assert!(matches!(decode(r#"{"elementId":"e1"}"#), Err(ProtocolError::MissingType)));
    assert!(matches!(decode(r#"{"type":7}"#), Err(ProtocolError::MissingType)));
    assert!(matches!(decode("[1,2]"), Err(ProtocolError::MissingType)));
}

#[test]
fn rejects_unknown_type() {
    let err = decode(r#"{"type":"element:explode","userId":"u"}"#).unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownType(ref t) if t == "element:explode"));
}

#[test]
fn rejects_missing_required_field() {
    let err = decode(r#"{"type":"element:drag","userId":"u1","ts":5,"elementId":"e1"}"#).unwrap_err();
    assert!(matches!(err, ProtocolError::Invalid { ref kind, .. } if kind == "element:drag"));
    assert!(err.to_string().starts_with("invalid `element:drag` message"));
}

#[test]
fn message_type_reads_string_tag() {
    assert_eq!(message_type(&json!({"type": "x"})), Some("x"));
    assert_eq!(message_type(&json!({"type": 1})), None);
    assert_eq!(message_type(&json!("type")), None);
}
