//! Per-connection handler: handshake, register, then route frames.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cardwatch_common::ConnectionId;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::directory::{Directory, DirectoryUser};
use crate::hub::Hub;
use crate::protocol::{self, ClientFrame};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Frame kind a client chose for its handshake. Replies use the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Text,
    Binary,
}

fn encode(framing: Framing, payload: String) -> Message {
    match framing {
        Framing::Text => Message::Text(payload.into()),
        Framing::Binary => Message::Binary(payload.into_bytes().into()),
    }
}

/// Text of a data frame, whichever kind it arrived as.
fn frame_text(msg: &Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
        _ => None,
    }
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    hub: Hub,
    directory: Arc<Directory>,
) {
    let (mut sink, mut stream) = ws.split();

    // 1. Handshake.
    let Some((token, framing)) = read_handshake(&mut stream, addr).await else {
        let _ = send(&mut sink, Framing::Text, protocol::error("expected handshake")).await;
        return;
    };
    let Some(user) = directory.resolve(&token) else {
        tracing::warn!(peer = %addr, "Handshake rejected: unknown token");
        let _ = send(&mut sink, framing, protocol::error("invalid token")).await;
        let _ = sink.close().await;
        return;
    };

    // 2. Register.
    let conn = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<String>(256);
    let first = hub.register(conn.clone(), user.clone(), tx).await;
    tracing::info!(peer = %addr, conn = %conn, user = %user.id, ?framing, "Client connected");

    if send(&mut sink, framing, protocol::connected(&user)).await.is_err() {
        hub.unregister(&conn).await;
        return;
    }
    if first {
        hub.broadcast_except(&conn, protocol::user_online(&user)).await;
    }

    // 3. Routing loop.
    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if send(&mut sink, framing, msg).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(msg)) => {
                        let Some(text) = frame_text(&msg) else { continue };
                        if let Some(reply) = route(&hub, &conn, &user, &text).await {
                            if send(&mut sink, framing, reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                }
            }
        }
    }

    // 4. Cleanup.
    tracing::info!(peer = %addr, conn = %conn, user = %user.id, "Client disconnected");
    if let Some(user_id) = hub.unregister(&conn).await {
        hub.broadcast_except(&conn, protocol::user_offline(&user_id)).await;
    }
}

/// Act on one client frame. Returns a reply for the sender, if any.
async fn route(hub: &Hub, conn: &ConnectionId, user: &DirectoryUser, text: &str) -> Option<String> {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(conn = %conn, error = %e, "Unparseable client frame");
            return Some(protocol::error("unknown event"));
        }
    };
    let now = chrono::Utc::now().timestamp_millis();

    match frame {
        ClientFrame::Handshake(_) => {
            tracing::debug!(conn = %conn, "Ignoring repeated handshake");
        }
        ClientFrame::GetOnlineUsers => {
            return Some(protocol::online_users(&hub.roster().await));
        }
        ClientFrame::ActivityUpdate(activity) => {
            hub.broadcast_except(conn, protocol::user_activity(user, &activity, now))
                .await;
        }
        ClientFrame::Viewing(target) => {
            hub.send_to_room_except(&target.room(), conn, protocol::viewing_indicator(user, &target, now))
                .await;
        }
        ClientFrame::TypingStart(target) => {
            hub.send_to_room_except(&target.room(), conn, protocol::typing_indicator(user, &target, true))
                .await;
        }
        ClientFrame::TypingStop(target) => {
            hub.send_to_room_except(&target.room(), conn, protocol::typing_indicator(user, &target, false))
                .await;
        }
        ClientFrame::EditingStart(target) => {
            hub.send_to_room_except(
                &target.room(),
                conn,
                protocol::editing_indicator(user, &target, true, now),
            )
            .await;
        }
        ClientFrame::EditingStop(target) => {
            hub.send_to_room_except(
                &target.room(),
                conn,
                protocol::editing_indicator(user, &target, false, now),
            )
            .await;
        }
        ClientFrame::JoinRoom(room) => {
            hub.join(conn, &room).await;
        }
        ClientFrame::LeaveRoom(room) => {
            hub.leave(conn, &room).await;
        }
    }
    None
}

/// Read and parse the first data frame as a handshake.
async fn read_handshake(stream: &mut WsSource, addr: SocketAddr) -> Option<(String, Framing)> {
    let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.next()).await;

    let msg = match frame {
        Ok(Some(Ok(msg))) => msg,
        Ok(Some(Err(e))) => {
            tracing::warn!(peer = %addr, error = %e, "WS error during handshake");
            return None;
        }
        Ok(None) => {
            tracing::debug!(peer = %addr, "Connection closed before handshake");
            return None;
        }
        Err(_) => {
            tracing::warn!(peer = %addr, "Handshake timeout (10s)");
            return None;
        }
    };

    let framing = match msg {
        Message::Binary(_) => Framing::Binary,
        _ => Framing::Text,
    };
    let text = frame_text(&msg)?;
    match ClientFrame::parse(&text) {
        Ok(ClientFrame::Handshake(h)) => Some((h.auth.token, framing)),
        Ok(other) => {
            tracing::warn!(peer = %addr, frame = ?other, "First frame was not a handshake");
            None
        }
        Err(e) => {
            tracing::warn!(peer = %addr, error = %e, "Invalid handshake");
            None
        }
    }
}

async fn send(
    sink: &mut WsSink,
    framing: Framing,
    payload: String,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    sink.send(encode(framing, payload)).await
}
