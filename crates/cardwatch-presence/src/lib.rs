//! Real-time presence for the Cardwatch admin dashboard.
//!
//! Who is online, who is looking at or editing which record, a rolling
//! activity feed, and pushed notifications, over one authenticated
//! websocket per session.

pub mod clock;
pub mod identity;
pub mod presence;
pub mod protocol;
pub mod realtime;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::{AuthSession, Identity};
pub use presence::{
    IndicatorEntry, Notification, PresenceClient, PresenceConfig, PresenceHandle,
    PresenceSnapshot, ResourceKey, ResourceWatch,
};
pub use protocol::{ActivityEvent, Envelope, InboundEvent, OnlineUser, OutboundEvent};
pub use realtime::{ConnectionState, RealtimeClient};
