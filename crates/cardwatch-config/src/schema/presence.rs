//! Presence transport and reconnect configuration types.

use serde::{Deserialize, Serialize};

/// How presence frames are carried over the websocket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    /// JSON in text frames.
    Text,
    /// JSON bytes in binary frames.
    Binary,
}

/// Presence connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub enabled: bool,
    pub server_url: String,
    /// Handshake deadline in milliseconds (valid range: 500-60000).
    pub connect_timeout_ms: u64,
    /// Attempts the transport makes on its own before the reconnect
    /// backoff takes over (valid range: 0-10).
    pub transport_retries: u32,
    pub transport_retry_delay_ms: u64,
    /// Framing modes in fallback order. Must not be empty.
    pub framing: Vec<FramingMode>,
    /// "Still viewing" heartbeat for mounted detail pages (valid range: 5-300).
    pub heartbeat_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_url: "ws://127.0.0.1:4100/presence".into(),
            connect_timeout_ms: 5000,
            transport_retries: 2,
            transport_retry_delay_ms: 500,
            framing: vec![FramingMode::Text, FramingMode::Binary],
            heartbeat_interval_secs: 30,
        }
    }
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Valid range: 1-20.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}
