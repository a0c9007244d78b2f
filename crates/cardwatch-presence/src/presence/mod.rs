//! Presence state for the dashboard.
//!
//! Server events flow through the inbound throttle into the store;
//! consumer reads pass through the staleness reaper; consumer actions go
//! out through the throttled activity emitter. [`PresenceClient`] wires
//! these to one realtime connection.

mod client;
mod inbound;
mod outbound;
mod reaper;
mod store;
mod types;

pub use client::{PresenceClient, PresenceHandle, PresenceSnapshot, ResourceWatch};
pub use inbound::InboundThrottle;
pub use outbound::{ActivityEmitter, OutboundAction, OutboundSink, OutboundThrottle};
pub use reaper::{fresh_entries, is_fresh, StalenessReaper};
pub use store::PresenceStore;
pub use types::{
    InboundWindows, IndicatorEntry, Notification, OutboundWindows, PresenceConfig, ResourceKey,
    TypingKey,
};
