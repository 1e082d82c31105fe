#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::Uri;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use chat_client::session::{SessionEvent, SessionOptions};
use chat_common::ChatRoom;

/// Instructions for one server-side connection.
pub enum ServerAction {
    Text(String),
    /// Drop the socket without a close handshake.
    Drop,
}

/// The server's view of one accepted WebSocket.
pub struct ServerConn {
    pub uri: Uri,
    pub outbound: mpsc::UnboundedSender<ServerAction>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl ServerConn {
    pub fn send(&self, text: &str) {
        self.outbound
            .send(ServerAction::Text(text.to_string()))
            .expect("server socket gone");
    }

    pub fn drop_abruptly(&self) {
        let _ = self.outbound.send(ServerAction::Drop);
    }

    pub async fn recv(&mut self) -> String {
        time::timeout(Duration::from_secs(5), self.inbound.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client frame channel closed")
    }
}

#[derive(Clone)]
struct ServerState {
    accepted: mpsc::UnboundedSender<ServerConn>,
    rooms: Vec<String>,
}

/// Start a chat server on an ephemeral port.
/// Returns the bound address and a receiver yielding each accepted connection.
pub async fn start_server(rooms: &[&str]) -> (SocketAddr, mpsc::UnboundedReceiver<ServerConn>) {
    let (accepted, conns) = mpsc::unbounded_channel();
    let state = ServerState {
        accepted,
        rooms: rooms.iter().map(|r| r.to_string()).collect(),
    };

    let app = Router::new()
        .route("/chatapp/chatrooms/{room}", get(ws_handler))
        .route("/api/chatrooms", get(list_rooms))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, conns)
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    listener.local_addr().unwrap()
}

async fn list_rooms(State(state): State<ServerState>) -> Json<Vec<ChatRoom>> {
    Json(
        state
            .rooms
            .iter()
            .map(|id| ChatRoom { id: id.clone() })
            .collect(),
    )
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    uri: Uri,
    State(state): State<ServerState>,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, uri, state.accepted))
}

async fn serve_socket(socket: WebSocket, uri: Uri, accepted: mpsc::UnboundedSender<ServerConn>) {
    let (outbound, mut actions) = mpsc::unbounded_channel();
    let (frames, inbound) = mpsc::unbounded_channel();
    let _ = accepted.send(ServerConn {
        uri,
        outbound,
        inbound,
    });

    let (mut write, mut read) = socket.split();
    loop {
        tokio::select! {
            action = actions.recv() => match action {
                Some(ServerAction::Text(text)) => {
                    if write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(ServerAction::Drop) | None => break,
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = frames.send(text.to_string());
                }
                // Keep reading so the close reply gets flushed.
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}

pub fn fast_options() -> SessionOptions {
    SessionOptions::default().with_reconnect_delay(Duration::from_millis(100))
}

pub async fn next_conn(conns: &mut mpsc::UnboundedReceiver<ServerConn>) -> ServerConn {
    time::timeout(Duration::from_secs(5), conns.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("server stopped")
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("session driver stopped")
}
