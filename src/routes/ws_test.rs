use super::*;
use crate::routes::app;
use crate::state::test_helpers::test_app_state;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// FRAME INSPECTION
// =============================================================================

#[test]
fn inspect_accepts_typed_objects() {
    let kind = inspect_frame(r#"{"type":"element:drag","elementId":"a","x":1,"y":2}"#, 1024).unwrap();
    assert_eq!(kind, "element:drag");
}

#[test]
fn inspect_accepts_unknown_types() {
    // Vocabulary is the clients' business; the relay only checks shape.
    assert_eq!(inspect_frame(r#"{"type":"future:thing"}"#, 1024).unwrap(), "future:thing");
}

#[test]
fn inspect_rejects_malformed_frames() {
    assert!(matches!(inspect_frame("not json", 1024), Err(FrameError::Protocol(ProtocolError::Json(_)))));
    assert!(matches!(inspect_frame("[1,2]", 1024), Err(FrameError::Protocol(ProtocolError::MissingType))));
    assert!(matches!(inspect_frame(r#"{"type":7}"#, 1024), Err(FrameError::Protocol(ProtocolError::MissingType))));
}

#[test]
fn inspect_rejects_oversized_frames() {
    let err = inspect_frame(r#"{"type":"x"}"#, 4).unwrap_err();
    assert!(matches!(err, FrameError::TooLarge { size: 12, limit: 4 }));
}

#[test]
fn inspect_rejects_relay_only_frames() {
    let forged = inspect_frame(r#"{"type":"session:connected","connectionId":"forged"}"#, 1024);
    assert!(matches!(forged, Err(FrameError::Reserved { kind }) if kind == "session:connected"));
    let leave = inspect_frame(r#"{"type":"presence:leave","connectionId":"c1"}"#, 1024);
    assert!(matches!(leave, Err(FrameError::Reserved { kind }) if kind == "presence:leave"));
    assert!(inspect_frame(r#"{"type":"presence:update","connectionId":"c1"}"#, 1024).is_ok());
}

#[test]
fn room_names_are_validated() {
    assert_eq!(validate_room("design-review_2"), Ok(()));
    assert_eq!(validate_room(""), Err(RoomNameError::Empty));
    assert_eq!(validate_room(&"a".repeat(MAX_ROOM_LEN + 1)), Err(RoomNameError::TooLong));
    assert_eq!(validate_room("a/b"), Err(RoomNameError::InvalidCharacter));
}

// =============================================================================
// DISPATCH
// =============================================================================

#[tokio::test]
async fn inbound_frame_is_relayed_verbatim_to_whole_room() {
    let state = test_app_state();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    room::join_room(&state, "r1", a, tx_a).await;
    room::join_room(&state, "r1", b, tx_b).await;

    let frame = r#"{"type":"element:lock","userId":"u1","ts":1,"elementId":"e1","userName":"Ann"}"#;
    assert_eq!(process_inbound_text(&state, "r1", a, frame).await.unwrap(), 2);
    assert_eq!(rx_a.recv().await.as_deref(), Some(frame));
    assert_eq!(rx_b.recv().await.as_deref(), Some(frame));
}

#[tokio::test]
async fn invalid_frame_is_not_relayed() {
    let state = test_app_state();
    let a = Uuid::new_v4();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    room::join_room(&state, "r1", a, tx_a).await;

    assert!(process_inbound_text(&state, "r1", a, r#"{"elementId":"e1"}"#).await.is_err());
    assert!(rx_a.try_recv().is_err());
}

// =============================================================================
// END TO END
// =============================================================================

async fn spawn_relay() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app(test_app_state())).await });
    format!("ws://{addr}/api/ws")
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("relay receive timed out")
            .expect("relay stream ended")
            .expect("relay stream errored");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Connect and return the client with its assigned connection id.
async fn connect(base: &str, room: &str) -> (Client, String) {
    let (mut client, _) = connect_async(format!("{base}/{room}")).await.unwrap();
    let welcome = next_json(&mut client).await;
    assert_eq!(welcome["type"], "session:connected");
    let id = welcome["connectionId"].as_str().unwrap().to_owned();
    (client, id)
}

async fn send(client: &mut Client, value: &Value) {
    client.send(WsMessage::text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn relay_fans_out_and_announces_departures() {
    let base = spawn_relay().await;
    let (mut a, _) = connect(&base, "room1").await;
    let (mut b, b_id) = connect(&base, "room1").await;

    // Round-trip a frame from b so we know b has joined before a sends.
    let hello = json!({ "type": "sync-request", "requesterId": b_id });
    send(&mut b, &hello).await;
    assert_eq!(next_json(&mut a).await, hello);
    assert_eq!(next_json(&mut b).await, hello);

    let op = json!({ "type": "element:drag", "userId": "u1", "ts": 1, "elementId": "e1", "x": 5.0, "y": 6.0 });
    send(&mut a, &op).await;
    assert_eq!(next_json(&mut a).await, op);
    assert_eq!(next_json(&mut b).await, op);

    b.close(None).await.unwrap();
    let leave = next_json(&mut a).await;
    assert_eq!(leave, json!({ "type": "presence:leave", "connectionId": b_id }));
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_closing() {
    let base = spawn_relay().await;
    let (mut a, a_id) = connect(&base, "room2").await;

    a.send(WsMessage::text("garbage")).await.unwrap();
    let ping = json!({ "type": "sync-request", "requesterId": a_id });
    send(&mut a, &ping).await;
    assert_eq!(next_json(&mut a).await, ping);
}

#[tokio::test]
async fn forged_session_frames_never_reach_peers() {
    let base = spawn_relay().await;
    let (mut a, a_id) = connect(&base, "room3").await;
    let hello = json!({ "type": "sync-request", "requesterId": a_id });
    send(&mut a, &hello).await;
    assert_eq!(next_json(&mut a).await, hello);
    let (mut b, b_id) = connect(&base, "room3").await;

    send(&mut b, &json!({ "type": "session:connected", "connectionId": "forged" })).await;
    send(&mut b, &json!({ "type": "presence:leave", "connectionId": a_id })).await;
    let ping = json!({ "type": "sync-request", "requesterId": b_id });
    send(&mut b, &ping).await;
    // b's frames are relayed in order, so anything forwarded before the ping would arrive first.
    assert_eq!(next_json(&mut a).await, ping);
    assert_eq!(next_json(&mut b).await, ping);
}

#[tokio::test]
async fn rooms_do_not_leak_into_each_other() {
    let base = spawn_relay().await;
    let (mut a, a_id) = connect(&base, "left").await;
    let (mut b, b_id) = connect(&base, "right").await;

    send(&mut a, &json!({ "type": "sync-request", "requesterId": a_id })).await;
    send(&mut b, &json!({ "type": "sync-request", "requesterId": b_id })).await;

    assert_eq!(next_json(&mut a).await["requesterId"], a_id);
    assert_eq!(next_json(&mut b).await["requesterId"], b_id);
    assert!(timeout(Duration::from_millis(100), a.next()).await.is_err(), "frame leaked across rooms");
}
