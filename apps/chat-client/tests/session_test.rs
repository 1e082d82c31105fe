mod common;

use std::time::Duration;

use chat_client::session::{ChannelHandler, ConnectParams, MessageBody, Phase, SessionClient, SessionEvent};
use chat_client::SessionError;
use chat_common::EventId;
use tokio::time;

fn params(addr: std::net::SocketAddr) -> ConnectParams {
    ConnectParams::new("alice", "general", addr.ip().to_string(), addr.port())
}

fn client() -> (SessionClient, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>) {
    let (handler, events) = ChannelHandler::new();
    (SessionClient::new(handler, common::fast_options()), events)
}

fn envelope(id: &str, user: &str, text: &str) -> String {
    serde_json::json!({
        "message": { "timestamp": 1_700_000_000_000i64, "userId": user, "chatRoom": "general", "message": text },
        "lastEventId": id,
    })
    .to_string()
}

fn chat_line(event: SessionEvent) -> (String, String) {
    match event {
        SessionEvent::Message(m) => match m.body {
            MessageBody::Chat(chat) => (chat.user_id, chat.message),
            other => panic!("expected chat body, got {other:?}"),
        },
        other => panic!("expected message, got {other:?}"),
    }
}

#[tokio::test]
async fn delivers_once_and_resumes_after_drop() {
    let (addr, mut conns) = common::start_server(&[]).await;
    let (client, mut events) = client();

    client.connect(params(addr)).unwrap();
    let conn = common::next_conn(&mut conns).await;
    assert_eq!(conn.uri.path(), "/chatapp/chatrooms/general");
    assert_eq!(conn.uri.query(), Some("userid=alice"));
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Connected);
    assert_eq!(client.phase(), Phase::Connected);

    conn.send(&envelope("1/bob", "bob", "hi"));
    conn.send(&envelope("1/bob", "bob", "hi"));
    conn.send(&envelope("2/carol", "carol", "hey"));

    assert_eq!(chat_line(common::next_event(&mut events).await), ("bob".into(), "hi".into()));
    assert_eq!(chat_line(common::next_event(&mut events).await), ("carol".into(), "hey".into()));

    conn.drop_abruptly();
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Interrupted);
    assert_eq!(client.last_event_id(), Some(EventId::from("2/carol")));

    let conn = common::next_conn(&mut conns).await;
    assert_eq!(conn.uri.path(), "/chatapp/chatrooms/general");
    assert_eq!(conn.uri.query(), Some("userid=alice&rejoin&lasteventid=2%2Fcarol"));
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Connected);

    // Replay overlaps what was already delivered.
    conn.send(&envelope("2/carol", "carol", "hey"));
    conn.send(&envelope("3/bob", "bob", "back"));
    assert_eq!(chat_line(common::next_event(&mut events).await), ("bob".into(), "back".into()));
}

#[tokio::test]
async fn send_writes_outbound_envelope() {
    let (addr, mut conns) = common::start_server(&[]).await;
    let (client, mut events) = client();

    client.connect(params(addr)).unwrap();
    let mut conn = common::next_conn(&mut conns).await;
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Connected);

    client.send("hello room").unwrap();
    let frame: serde_json::Value = serde_json::from_str(&conn.recv().await).unwrap();
    assert_eq!(frame["userId"], "alice");
    assert_eq!(frame["message"], "hello room");
    assert!(frame["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn send_before_connect_is_rejected() {
    let (client, _events) = client();
    let err = client.send("too early").unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
}

#[tokio::test]
async fn disconnect_closes_and_stays_closed() {
    let (addr, mut conns) = common::start_server(&[]).await;
    let (client, mut events) = client();

    client.connect(params(addr)).unwrap();
    let conn = common::next_conn(&mut conns).await;
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Connected);
    conn.send(&envelope("1/bob", "bob", "hi"));
    common::next_event(&mut events).await;

    client.disconnect();
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Closed);
    assert_eq!(client.phase(), Phase::Disconnected);
    assert!(client.last_event_id().is_none());
    assert!(matches!(client.send("gone"), Err(SessionError::NotConnected)));

    // Well past the reconnect delay: no new connection, no more events.
    time::sleep(Duration::from_millis(500)).await;
    assert!(conns.try_recv().is_err());
    assert!(events.try_recv().is_err());

    // Disconnecting again is a no-op.
    client.disconnect();
    time::sleep(Duration::from_millis(100)).await;
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn reconnects_after_disconnect_start_fresh() {
    let (addr, mut conns) = common::start_server(&[]).await;
    let (client, mut events) = client();

    client.connect(params(addr)).unwrap();
    let conn = common::next_conn(&mut conns).await;
    common::next_event(&mut events).await;
    conn.send(&envelope("1/bob", "bob", "hi"));
    common::next_event(&mut events).await;

    client.disconnect();
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Closed);

    client.connect(params(addr)).unwrap();
    let conn = common::next_conn(&mut conns).await;
    assert_eq!(conn.uri.query(), Some("userid=alice"));
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Connected);

    // A new session does not remember ids from the old one.
    conn.send(&envelope("1/bob", "bob", "hi"));
    assert_eq!(chat_line(common::next_event(&mut events).await), ("bob".into(), "hi".into()));
}

#[tokio::test]
async fn unreachable_server_keeps_retrying() {
    let addr = common::unused_addr().await;
    let (client, mut events) = client();

    client.connect(params(addr)).unwrap();
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Interrupted);
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Interrupted);
    assert_eq!(client.phase(), Phase::Interrupted);

    client.disconnect();
    assert_eq!(common::next_event(&mut events).await, SessionEvent::Closed);
}

#[tokio::test]
async fn legacy_text_frames_pass_through() {
    let (addr, mut conns) = common::start_server(&[]).await;
    let (client, mut events) = client();

    client.connect(params(addr)).unwrap();
    let conn = common::next_conn(&mut conns).await;
    common::next_event(&mut events).await;

    conn.send("plain words");
    conn.send("plain words");
    conn.send("{not json");
    conn.send(&envelope("5/bob", "bob", "after"));

    for expected in ["plain words", "plain words"] {
        match common::next_event(&mut events).await {
            SessionEvent::Message(m) => {
                assert!(m.event_id.is_none());
                assert_eq!(m.body, MessageBody::Text(expected.to_string()));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }
    // The malformed frame is dropped without ending the session.
    assert_eq!(chat_line(common::next_event(&mut events).await), ("bob".into(), "after".into()));
    assert_eq!(client.phase(), Phase::Connected);
}

#[tokio::test]
async fn invalid_parameters_fail_synchronously() {
    let (client, _events) = client();

    let err = client
        .connect(ConnectParams::new("alice", "", "localhost", 9091))
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidParameter { field: "room", .. }));

    let err = client
        .connect(ConnectParams::new("al ice", "general", "localhost", 9091))
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidParameter { field: "user_id", .. }));

    assert_eq!(client.phase(), Phase::Disconnected);
}

#[tokio::test]
async fn secure_scheme_is_rejected_up_front() {
    let (handler, mut events) = ChannelHandler::new();
    let client = SessionClient::new(handler, common::fast_options().with_scheme("wss"));

    let err = client
        .connect(ConnectParams::new("alice", "general", "localhost", 9091))
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidParameter { field: "scheme", .. }));

    time::sleep(Duration::from_millis(300)).await;
    assert!(events.try_recv().is_err());
    assert_eq!(client.phase(), Phase::Disconnected);
}
