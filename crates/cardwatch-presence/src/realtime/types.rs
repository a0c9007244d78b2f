//! Configuration, state and event types for the realtime client.

use std::time::Duration;

pub use cardwatch_config::schema::FramingMode;

use crate::protocol::Envelope;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How to open the websocket.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub server_url: String,
    /// Deadline for socket open plus handshake ack, per attempt.
    pub connect_timeout: Duration,
    /// Extra attempts the transport makes before reporting failure to the
    /// reconnect loop.
    pub retries: u32,
    pub retry_delay: Duration,
    /// Framing modes, tried in order on every attempt.
    pub framing: Vec<FramingMode>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:4100/presence".into(),
            connect_timeout: Duration::from_millis(5000),
            retries: 2,
            retry_delay: Duration::from_millis(500),
            framing: vec![FramingMode::Text, FramingMode::Binary],
        }
    }
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_ms: u64,
    pub max_ms: u64,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_ms: 1000,
            max_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay before reconnect attempt `attempt` (0-based):
    /// `min(base * 2^attempt, max)`. `None` once the attempts are used up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self.base_ms.saturating_mul(factor).min(self.max_ms);
        Some(Duration::from_millis(ms))
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle of the presence connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Handshake rejected or reconnect attempts exhausted. Behaves like
    /// `Disconnected` until the next explicit connect.
    Failed,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// A connect attempt or live connection exists.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Something the connection loop observed.
///
/// `generation` identifies the `connect()` call that spawned the loop, so
/// events still in flight after a disconnect can be told apart from a
/// fresh session's.
#[derive(Debug, Clone)]
pub struct RealtimeEvent {
    pub generation: u64,
    pub kind: RealtimeEventKind,
}

#[derive(Debug, Clone)]
pub enum RealtimeEventKind {
    /// Handshake acknowledged. `user_id` is what the server resolved the
    /// token to, if it said.
    Connected { user_id: Option<String> },
    /// A server frame.
    Message(Envelope),
    /// Connection lost; the loop is about to back off and retry.
    Dropped { reason: String },
    /// The server refused the token. No retry.
    Rejected { reason: String },
    /// Reconnect attempts exhausted.
    GaveUp,
}
