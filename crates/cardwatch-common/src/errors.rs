use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures inside the realtime presence transport.
///
/// These never cross the public presence surface; the connection loop logs
/// them and lets the reconnect state machine deal with the outcome.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("websocket connect failed: {0}")]
    Connect(String),

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("handshake timed out after {0}ms")]
    HandshakeTimeout(u64),

    #[error("connection closed by server")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("frame encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CardwatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Other(String),
}
