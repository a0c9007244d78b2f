//! Socket open, handshake and frame codec.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

use cardwatch_common::PresenceError;

use crate::protocol::{Envelope, InboundEvent, OutboundEvent};

use super::types::{FramingMode, TransportConfig};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, WsMessage>;
pub(crate) type WsSource = SplitStream<WsStream>;

/// An authenticated socket.
pub(crate) struct Transport {
    pub(crate) sink: WsSink,
    pub(crate) stream: WsSource,
    pub(crate) framing: FramingMode,
    /// User id from the handshake ack, if the server sent one.
    pub(crate) user_id: Option<String>,
}

pub(crate) fn encode_frame(framing: FramingMode, json: String) -> WsMessage {
    match framing {
        FramingMode::Text => WsMessage::Text(json.into()),
        FramingMode::Binary => WsMessage::Binary(json.into_bytes().into()),
    }
}

/// Envelope carried by a data frame. Control frames yield `None`.
/// Both framings are accepted regardless of which one we send with.
pub(crate) fn decode_frame(msg: &WsMessage) -> Option<Result<Envelope, PresenceError>> {
    match msg {
        WsMessage::Text(text) => Some(Envelope::from_text(text)),
        WsMessage::Binary(bytes) => Some(Envelope::from_slice(bytes)),
        _ => None,
    }
}

pub(crate) async fn send_event(
    sink: &mut WsSink,
    framing: FramingMode,
    event: &OutboundEvent,
) -> Result<(), PresenceError> {
    let json = event.to_json()?;
    sink.send(encode_frame(framing, json))
        .await
        .map_err(|e| PresenceError::Connect(e.to_string()))
}

/// Open the socket and complete the handshake.
///
/// Each attempt walks the configured framing modes in order under the
/// connect timeout. A rejected token ends immediately; anything else is
/// retried `retries` more times, `retry_delay` apart.
pub(crate) async fn open(config: &TransportConfig, token: &str) -> Result<Transport, PresenceError> {
    let mut last_err = PresenceError::Connect("no framing modes configured".into());

    for attempt in 0..=config.retries {
        if attempt > 0 {
            tokio::time::sleep(config.retry_delay).await;
        }
        for &framing in &config.framing {
            let result = tokio::time::timeout(
                config.connect_timeout,
                open_once(&config.server_url, framing, token),
            )
            .await;
            match result {
                Ok(Ok(transport)) => return Ok(transport),
                Ok(Err(e @ PresenceError::HandshakeRejected(_))) => return Err(e),
                Ok(Err(e)) => {
                    debug!(attempt, ?framing, error = %e, "transport attempt failed");
                    last_err = e;
                }
                Err(_elapsed) => {
                    let ms = config.connect_timeout.as_millis() as u64;
                    debug!(attempt, ?framing, "transport attempt timed out after {ms}ms");
                    last_err = PresenceError::HandshakeTimeout(ms);
                }
            }
        }
    }

    Err(last_err)
}

async fn open_once(
    url: &str,
    framing: FramingMode,
    token: &str,
) -> Result<Transport, PresenceError> {
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| PresenceError::Connect(e.to_string()))?;
    let (mut sink, mut stream) = ws.split();

    send_event(&mut sink, framing, &OutboundEvent::handshake(token)).await?;

    let envelope = loop {
        let frame = stream
            .next()
            .await
            .ok_or(PresenceError::Closed)?
            .map_err(|e| PresenceError::Connect(e.to_string()))?;
        if let WsMessage::Close(_) = frame {
            return Err(PresenceError::Closed);
        }
        if let Some(decoded) = decode_frame(&frame) {
            break decoded?;
        }
    };

    match InboundEvent::decode(envelope, 0)? {
        InboundEvent::Connected { user_id } => Ok(Transport {
            sink,
            stream,
            framing,
            user_id,
        }),
        InboundEvent::Error { message } => Err(PresenceError::HandshakeRejected(message)),
        other => Err(PresenceError::Protocol(format!(
            "expected connected ack, got {}",
            other.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_framing_round_trips() {
        let msg = encode_frame(FramingMode::Text, r#"{"event":"connected"}"#.into());
        assert!(matches!(msg, WsMessage::Text(_)));
        let env = decode_frame(&msg).unwrap().unwrap();
        assert_eq!(env.event, "connected");
    }

    #[test]
    fn binary_framing_round_trips() {
        let msg = encode_frame(
            FramingMode::Binary,
            r#"{"event":"user_online","data":{"userId":"u1"}}"#.into(),
        );
        assert!(matches!(msg, WsMessage::Binary(_)));
        let env = decode_frame(&msg).unwrap().unwrap();
        assert_eq!(env.data["userId"], "u1");
    }

    #[test]
    fn control_frames_are_skipped() {
        assert!(decode_frame(&WsMessage::Ping(Vec::new().into())).is_none());
    }

    #[tokio::test]
    async fn open_fails_fast_without_server() {
        let config = TransportConfig {
            server_url: "ws://127.0.0.1:1/presence".into(),
            retries: 1,
            retry_delay: std::time::Duration::from_millis(10),
            ..TransportConfig::default()
        };
        let err = open(&config, "t").await.err().unwrap();
        assert!(matches!(
            err,
            PresenceError::Connect(_) | PresenceError::HandshakeTimeout(_)
        ));
    }

    #[tokio::test]
    async fn open_with_no_framing_reports_it() {
        let config = TransportConfig {
            framing: Vec::new(),
            retries: 0,
            ..TransportConfig::default()
        };
        let err = open(&config, "t").await.err().unwrap();
        assert!(err.to_string().contains("no framing modes"));
    }
}
