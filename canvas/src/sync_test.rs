use super::*;
use crate::doc::Payload;

fn elements(n: usize) -> Vec<Element> {
    (0..n).map(|i| Element::with_id(format!("e{i}"), Payload::text("x"), 0.0, 0.0, 1.0, 1.0)).collect()
}

fn response(to: &str, n: usize) -> SyncMessage {
    SyncMessage::Response { requester_id: to.into(), elements: elements(n), canvas: CanvasConfig::default() }
}

/// A protocol that has already sent its request.
fn awaiting(now: Instant) -> SyncProtocol {
    let mut sync = SyncProtocol::default();
    sync.connect_at("me", now);
    sync.poll_at(now + Duration::from_millis(500));
    sync
}

#[test]
fn starts_idle() {
    let sync = SyncProtocol::default();
    assert_eq!(sync.state(), SyncState::Idle);
    assert!(sync.next_deadline().is_none());
    assert!(!sync.is_synced());
}

#[test]
fn request_fires_once_after_join_settle() {
    let now = Instant::now();
    let mut sync = SyncProtocol::default();
    sync.connect_at("me", now);
    assert_eq!(sync.next_deadline(), Some(now + Duration::from_millis(500)));
    assert!(sync.poll_at(now + Duration::from_millis(499)).is_none());

    let sent = sync.poll_at(now + Duration::from_millis(500));
    assert_eq!(sent, Some(SyncMessage::Request { requester_id: "me".into() }));
    assert!(matches!(sync.state(), SyncState::AwaitingSyncResponse { .. }));
    assert!(sync.poll_at(now + Duration::from_millis(501)).is_none());
}

#[test]
fn cancel_disarms_timer() {
    let now = Instant::now();
    let mut sync = SyncProtocol::default();
    sync.connect_at("me", now);
    sync.cancel();
    assert_eq!(sync.state(), SyncState::Idle);
    assert!(sync.poll_at(now + Duration::from_secs(5)).is_none());
}

#[test]
fn alone_after_response_window() {
    let now = Instant::now();
    let mut sync = awaiting(now);
    assert!(sync.poll_at(now + Duration::from_millis(1999)).is_none());
    assert!(!sync.is_synced());
    sync.poll_at(now + Duration::from_millis(2000));
    assert!(sync.is_synced());
}

#[test]
fn larger_response_applies() {
    let mut sync = awaiting(Instant::now());
    let action = sync.handle(response("me", 3), 0);
    assert!(matches!(action, SyncAction::Load { ref elements, .. } if elements.len() == 3));
    assert!(sync.is_synced());
}

#[test]
fn smaller_or_equal_response_keeps_local_but_syncs() {
    let mut sync = awaiting(Instant::now());
    assert_eq!(sync.handle(response("me", 2), 2), SyncAction::None);
    assert!(sync.is_synced());
}

#[test]
fn largest_of_several_responses_wins_in_either_order() {
    // 3 then 7
    let mut sync = awaiting(Instant::now());
    let mut local = 0;
    for n in [3, 7] {
        if let SyncAction::Load { elements, .. } = sync.handle(response("me", n), local) {
            local = elements.len();
        }
    }
    assert_eq!(local, 7);

    // 7 then 3
    let mut sync = awaiting(Instant::now());
    let mut local = 0;
    for n in [7, 3] {
        if let SyncAction::Load { elements, .. } = sync.handle(response("me", n), local) {
            local = elements.len();
        }
    }
    assert_eq!(local, 7);
}

#[test]
fn response_for_someone_else_is_ignored() {
    let mut sync = awaiting(Instant::now());
    assert_eq!(sync.handle(response("other", 9), 0), SyncAction::None);
    assert!(!sync.is_synced());
}

#[test]
fn response_before_request_is_ignored() {
    let mut sync = SyncProtocol::default();
    sync.connect_at("me", Instant::now());
    assert_eq!(sync.handle(response("me", 9), 0), SyncAction::None);
}

#[test]
fn synced_peer_replies_to_other_requesters() {
    let now = Instant::now();
    let mut sync = awaiting(now);
    sync.poll_at(now + Duration::from_secs(3));
    assert_eq!(
        sync.handle(SyncMessage::Request { requester_id: "joiner".into() }, 4),
        SyncAction::Reply { requester_id: "joiner".into() }
    );
    assert_eq!(sync.handle(SyncMessage::Request { requester_id: "me".into() }, 4), SyncAction::None);
}

#[test]
fn peer_still_joining_replies_to_other_requesters() {
    let now = Instant::now();
    let mut sync = awaiting(now);
    assert_eq!(
        sync.handle(SyncMessage::Request { requester_id: "joiner".into() }, 1),
        SyncAction::Reply { requester_id: "joiner".into() }
    );
    assert!(matches!(sync.state(), SyncState::AwaitingSyncResponse { .. }));

    let mut settling = SyncProtocol::default();
    settling.connect_at("me", now);
    assert_eq!(
        settling.handle(SyncMessage::Request { requester_id: "joiner".into() }, 0),
        SyncAction::Reply { requester_id: "joiner".into() }
    );
}

#[test]
fn disconnected_peer_does_not_reply() {
    let mut sync = SyncProtocol::default();
    assert_eq!(sync.handle(SyncMessage::Request { requester_id: "joiner".into() }, 3), SyncAction::None);

    sync.connect_at("me", Instant::now());
    sync.cancel();
    assert!(sync.connection_id().is_none());
    assert_eq!(sync.handle(SyncMessage::Request { requester_id: "joiner".into() }, 3), SyncAction::None);
}

#[test]
fn full_sync_always_applies_except_own() {
    let mut sync = awaiting(Instant::now());
    let forced = SyncMessage::FullSync { sender_id: "peer".into(), elements: elements(1), canvas: CanvasConfig::default() };
    assert!(matches!(sync.handle(forced, 50), SyncAction::Load { .. }));
    assert!(sync.is_synced());

    let own = SyncMessage::FullSync { sender_id: "me".into(), elements: elements(1), canvas: CanvasConfig::default() };
    assert_eq!(sync.handle(own, 50), SyncAction::None);
}
