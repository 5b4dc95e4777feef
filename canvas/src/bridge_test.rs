#![allow(clippy::float_cmp)]

use std::time::Duration;

use serde_json::json;

use super::*;
use crate::doc::{Element, Payload, ShapeKind, Updates};
use crate::protocol::encode;

fn bridge(user: &str) -> Bridge {
    Bridge::new(Identity::new(user, user.to_uppercase()), &SyncConfig::default())
}

fn shape(id: &str) -> Element {
    Element::with_id(id, Payload::shape(ShapeKind::Rect, "#000000"), 10.0, 10.0, 40.0, 40.0)
}

fn fill(value: &str) -> Updates {
    match json!({ "fill": value }) {
        serde_json::Value::Object(map) => map,
        _ => Updates::new(),
    }
}

/// Connect and let the join handshake time out with no peers.
fn alone(user: &str, conn: &str, t0: Instant) -> Bridge {
    let mut b = bridge(user);
    b.connect_at(conn, t0);
    b.tick_at(t0 + Duration::from_millis(500));
    b.tick_at(t0 + Duration::from_millis(2000));
    assert_eq!(b.sync_state(), SyncState::Synced);
    b.take_outbound();
    b
}

fn relay(from: &mut Bridge, to: &mut Bridge, now: Instant) {
    for message in from.take_outbound() {
        to.receive_at(&encode(&message).unwrap(), now);
    }
}

fn kinds(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| serde_json::to_value(m).unwrap()["type"].as_str().unwrap().to_owned())
        .collect()
}

// =============================================================
// Lifecycle
// =============================================================

#[test]
fn connect_announces_presence_and_arms_join_timer() {
    let t0 = Instant::now();
    let mut b = bridge("u1");
    b.connect_at("c1", t0);
    assert_eq!(b.connection_id(), Some("c1"));
    assert_eq!(b.next_deadline(), Some(t0 + Duration::from_millis(500)));
    assert_eq!(kinds(&b.take_outbound()), ["presence:update"]);
}

#[test]
fn tick_sends_sync_request_after_settle() {
    let t0 = Instant::now();
    let mut b = bridge("u1");
    b.connect_at("c1", t0);
    b.take_outbound();

    b.tick_at(t0 + Duration::from_millis(499));
    assert!(b.take_outbound().is_empty());

    b.tick_at(t0 + Duration::from_millis(500));
    let out = b.take_outbound();
    assert_eq!(out, [Message::Sync(SyncMessage::Request { requester_id: "c1".into() })]);
}

#[test]
fn session_connected_starts_handshake() {
    let mut b = bridge("u1");
    b.receive(r#"{"type":"session:connected","connectionId":"c9"}"#);
    assert_eq!(b.connection_id(), Some("c9"));
    assert!(matches!(b.sync_state(), SyncState::AwaitingJoinWindow { .. }));
}

#[test]
fn repeated_session_connected_is_ignored() {
    let t0 = Instant::now();
    let mut b = alone("u1", "c1", t0);
    b.take_outbound();

    b.receive_at(r#"{"type":"session:connected","connectionId":"forged"}"#, t0);
    assert_eq!(b.connection_id(), Some("c1"));
    assert_eq!(b.sync_state(), SyncState::Synced);
    assert!(b.take_outbound().is_empty());
    assert!(b.apply_remote_at(&Operation::new("u2", Action::add(shape("a"))), t0));
}

#[test]
fn reconnect_after_disconnect_accepts_new_session() {
    let mut b = alone("u1", "c1", Instant::now());
    b.disconnect();
    b.receive(r#"{"type":"session:connected","connectionId":"c2"}"#);
    assert_eq!(b.connection_id(), Some("c2"));
    assert!(matches!(b.sync_state(), SyncState::AwaitingJoinWindow { .. }));
}

#[test]
fn disconnect_cancels_timers() {
    let mut b = bridge("u1");
    b.connect_at("c1", Instant::now());
    b.disconnect();
    assert_eq!(b.sync_state(), SyncState::Idle);
    assert_eq!(b.next_deadline(), None);
    assert_eq!(b.connection_id(), None);
}

// =============================================================
// Local operations
// =============================================================

#[test]
fn local_apply_is_immediate_and_broadcast_verbatim() {
    let mut b = alone("u1", "c1", Instant::now());
    let op = b.op(Action::add(shape("a")));
    assert!(b.apply_local(op.clone()));
    assert!(b.doc().contains("a"));
    assert_eq!(b.take_outbound(), [Message::Operation(op)]);
    assert_eq!(b.store().undo_depth(), 1);
}

#[test]
fn local_apply_works_before_sync() {
    let mut b = bridge("u1");
    assert!(b.apply_action(Action::add(shape("a"))));
    assert!(b.doc().contains("a"));
}

#[test]
fn undo_and_redo_broadcast_their_effects() {
    let mut b = alone("u1", "c1", Instant::now());
    b.apply_action(Action::add(shape("a")));
    b.apply_action(Action::update("a", fill("#ff0000")));
    b.take_outbound();

    assert!(b.undo());
    let out = b.take_outbound();
    assert_eq!(kinds(&out), ["element:update"]);
    assert!(matches!(
        &out[0],
        Message::Operation(op) if matches!(&op.action, Action::Update { updates, .. } if updates["fill"] == "#000000")
    ));

    assert!(b.redo());
    assert_eq!(kinds(&b.take_outbound()), ["element:update"]);
    assert!(matches!(&b.doc().get("a").unwrap().payload, Payload::Shape(s) if s.fill.as_deref() == Some("#ff0000")));
}

#[test]
fn undo_with_empty_history_sends_nothing() {
    let mut b = alone("u1", "c1", Instant::now());
    assert!(!b.undo());
    assert!(!b.redo());
    assert!(b.take_outbound().is_empty());
}

#[test]
fn remove_element_carries_removed_state() {
    let mut b = alone("u1", "c1", Instant::now());
    b.apply_action(Action::add(shape("a")));
    b.take_outbound();

    assert!(b.remove_element("a"));
    let out = b.take_outbound();
    assert!(matches!(
        &out[0],
        Message::Operation(op) if matches!(&op.action, Action::Remove { removed_element, .. } if removed_element.id == "a")
    ));
    assert!(!b.remove_element("a"));

    assert!(b.undo());
    assert!(b.doc().contains("a"));
}

#[test]
fn commit_gesture_undoes_to_gesture_start() {
    use crate::gesture::{Gesture, Modifiers};

    let mut b = alone("u1", "c1", Instant::now());
    b.apply_action(Action::add(shape("a")));

    let mut gesture = Gesture::begin_drag(b.doc(), "a", "u1", Point::new(10.0, 10.0)).unwrap();
    let no_snap = Modifiers { alt: true, ..Modifiers::default() };
    for x in [30.0, 60.0, 90.0] {
        if let Some(action) = gesture.pointer_move(Point::new(x, 10.0), no_snap).action {
            b.apply_action(action);
        }
    }
    assert!(b.commit_gesture(gesture.release().unwrap()));
    assert_eq!(b.doc().get("a").unwrap().x, 90.0);

    assert!(b.undo());
    assert_eq!(b.doc().get("a").unwrap().x, 10.0);
}

// =============================================================
// Remote operations
// =============================================================

#[test]
fn own_operations_are_not_reapplied() {
    let t0 = Instant::now();
    let mut b = alone("u1", "c1", t0);
    let echo = Operation::new("u1", Action::add(shape("a")));
    assert!(!b.apply_remote_at(&echo, t0));
    assert!(b.doc().is_empty());
}

#[test]
fn remote_operations_wait_for_sync() {
    let t0 = Instant::now();
    let mut b = bridge("u1");
    b.connect_at("c1", t0);
    let op = Operation::new("u2", Action::add(shape("a")));
    assert!(!b.apply_remote_at(&op, t0));

    b.tick_at(t0 + Duration::from_millis(500));
    b.tick_at(t0 + Duration::from_millis(2000));
    assert!(b.apply_remote_at(&op, t0 + Duration::from_millis(2001)));
    assert!(b.doc().contains("a"));
}

#[test]
fn remote_operations_do_not_enter_history() {
    let t0 = Instant::now();
    let mut b = alone("u1", "c1", t0);
    assert!(b.apply_remote_at(&Operation::new("u2", Action::add(shape("a"))), t0));
    assert_eq!(b.store().undo_depth(), 0);
    assert!(b.take_outbound().is_empty());
}

#[test]
fn remote_drags_are_throttled() {
    let t0 = Instant::now();
    let mut b = alone("u1", "c1", t0);
    b.apply_remote_at(&Operation::new("u2", Action::add(shape("a"))), t0);

    assert!(b.apply_remote_at(&Operation::new("u2", Action::drag("a", 20.0, 20.0)), t0));
    assert!(!b.apply_remote_at(&Operation::new("u2", Action::drag("a", 30.0, 30.0)), t0 + Duration::from_millis(10)));
    assert!(b.apply_remote_at(&Operation::new("u2", Action::drag("a", 40.0, 40.0)), t0 + Duration::from_millis(40)));
    assert_eq!(b.doc().get("a").unwrap().x, 40.0);
}

#[test]
fn malformed_frames_are_dropped() {
    let mut b = alone("u1", "c1", Instant::now());
    b.receive("not json");
    b.receive(r#"{"type":"element:explode","elementId":"a"}"#);
    b.receive(r#"{"elementId":"a"}"#);
    assert!(b.doc().is_empty());
    assert!(b.take_outbound().is_empty());
}

// =============================================================
// Sync
// =============================================================

#[test]
fn synced_peer_answers_join_request_with_state() {
    let t0 = Instant::now();
    let mut old = alone("u1", "c1", t0);
    old.apply_action(Action::add(shape("a")));
    old.take_outbound();

    old.receive_at(r#"{"type":"sync-request","requesterId":"c2"}"#, t0);
    let out = old.take_outbound();
    assert_eq!(kinds(&out), ["sync-response", "presence:update"]);
    assert!(matches!(
        &out[0],
        Message::Sync(SyncMessage::Response { requester_id, elements, .. }) if requester_id == "c2" && elements.len() == 1
    ));
}

#[test]
fn joiner_adopts_larger_response_and_clears_history() {
    let t0 = Instant::now();
    let mut old = alone("u1", "c1", t0);
    for id in ["a", "b", "c"] {
        old.apply_action(Action::add(shape(id)));
    }
    old.take_outbound();

    let mut joiner = bridge("u2");
    joiner.connect_at("c2", t0);
    joiner.apply_action(Action::add(shape("mine")));
    joiner.take_outbound();
    joiner.tick_at(t0 + Duration::from_millis(500));

    relay(&mut joiner, &mut old, t0);
    relay(&mut old, &mut joiner, t0);

    assert_eq!(joiner.sync_state(), SyncState::Synced);
    assert_eq!(joiner.doc().len(), 3);
    assert!(!joiner.doc().contains("mine"));
    assert_eq!(joiner.store().undo_depth(), 0);
}

#[test]
fn full_sync_overwrites_peers() {
    let t0 = Instant::now();
    let mut a = alone("u1", "c1", t0);
    let mut b = alone("u2", "c2", t0);
    b.apply_remote_at(&Operation::new("u3", Action::add(shape("stale"))), t0);

    a.apply_action(Action::add(shape("fresh")));
    a.take_outbound();
    assert!(a.broadcast_full_sync());
    relay(&mut a, &mut b, t0);

    assert!(b.doc().contains("fresh"));
    assert!(!b.doc().contains("stale"));
}

#[test]
fn full_sync_requires_a_connection() {
    let mut b = bridge("u1");
    assert!(!b.broadcast_full_sync());
    assert!(b.take_outbound().is_empty());
}

// =============================================================
// Presence
// =============================================================

#[test]
fn presence_tracks_peers_and_departures() {
    let t0 = Instant::now();
    let mut b = alone("u1", "c1", t0);
    let changes = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&changes);
    b.subscribe(move |change| sink.lock().unwrap().push(change));

    b.receive(r##"{"type":"presence:update","connectionId":"c2","userId":"u2","name":"Ann","color":"#4ECDC4","role":"editor","cursor":{"x":1.0,"y":2.0}}"##);
    let peers = b.presence();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].name, "Ann");

    b.receive(r#"{"type":"presence:leave","connectionId":"c2"}"#);
    assert!(b.presence().is_empty());
    assert_eq!(*changes.lock().unwrap(), [Change::Presence, Change::Presence]);
}

#[test]
fn own_presence_echo_is_ignored() {
    let mut b = alone("u1", "c1", Instant::now());
    b.set_cursor(Some(Point::new(5.0, 5.0)));
    let echo = b.take_outbound();
    for message in echo {
        b.receive(&encode(&message).unwrap());
    }
    assert!(b.presence().is_empty());
}

#[test]
fn cursor_and_selection_changes_are_announced() {
    let mut b = alone("u1", "c1", Instant::now());
    b.apply_action(Action::add(shape("a")));
    b.take_outbound();

    b.set_cursor(Some(Point::new(3.0, 4.0)));
    b.set_cursor(Some(Point::new(3.0, 4.0)));
    assert_eq!(kinds(&b.take_outbound()), ["presence:update"]);

    b.set_selection(vec!["a".into(), "ghost".into()]);
    let out = b.take_outbound();
    assert!(matches!(
        &out[0],
        Message::Presence(PresenceMessage::Update(record))
            if record.selection == ["a"] && record.cursor == Some(Point::new(3.0, 4.0))
    ));
}
