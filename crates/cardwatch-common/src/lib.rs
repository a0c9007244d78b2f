pub mod errors;
pub mod id;

pub use errors::{CardwatchError, ConfigError, PresenceError};
pub use id::{fallback_event_id, new_id, ConnectionId};

pub type Result<T> = std::result::Result<T, CardwatchError>;
