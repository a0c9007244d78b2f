use serde::{Deserialize, Serialize};
use std::fmt;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Id for an event the server sent without one: `<timestamp>-<random hex>`.
///
/// Uniqueness is best-effort only; two ids minted in the same millisecond
/// collide with probability 2^-32.
pub fn fallback_event_id(timestamp_ms: i64) -> String {
    format!("{timestamp_ms}-{:08x}", rand::random::<u32>())
}

/// Identifies one live socket. A user may hold several at once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
