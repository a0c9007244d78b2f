//! Realtime transport for the presence socket.
//!
//! Owns the single websocket: handshake with framing fallback and a
//! bounded connect timeout, a background connection loop with
//! exponential-backoff reconnect, and room re-join after a reconnect.
//! Frames are surfaced as raw envelopes; interpreting them is the
//! presence layer's job.

mod client;
mod connection;
mod transport;
mod types;

pub use client::RealtimeClient;
pub use types::{
    Backoff, ConnectionState, FramingMode, RealtimeEvent, RealtimeEventKind, TransportConfig,
};
