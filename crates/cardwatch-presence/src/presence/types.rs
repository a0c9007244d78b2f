//! Runtime settings, composite keys and stored entry types.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use cardwatch_common::fallback_event_id;
use cardwatch_config::CardwatchConfig;

use crate::protocol::NotificationPayload;
use crate::realtime::{Backoff, TransportConfig};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Windows applied to server-pushed events, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundWindows {
    pub roster_ms: i64,
    pub activity_ms: i64,
    pub activity_dedup_ms: i64,
}

impl Default for InboundWindows {
    fn default() -> Self {
        Self {
            roster_ms: 2000,
            activity_ms: 1000,
            activity_dedup_ms: 5000,
        }
    }
}

/// Windows applied to client-initiated events, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundWindows {
    pub activity_ms: i64,
    pub viewing_ms: i64,
    pub typing_ms: i64,
    pub editing_ms: i64,
    /// One timestamp per action instead of the shared one.
    pub independent: bool,
}

impl Default for OutboundWindows {
    fn default() -> Self {
        Self {
            activity_ms: 5000,
            viewing_ms: 10_000,
            typing_ms: 3000,
            editing_ms: 5000,
            independent: false,
        }
    }
}

/// Everything the presence client needs at runtime.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub transport: TransportConfig,
    pub backoff: Backoff,
    pub inbound: InboundWindows,
    pub outbound: OutboundWindows,
    pub viewing_ttl_ms: i64,
    pub editing_ttl_ms: i64,
    pub activity_capacity: usize,
    pub notification_capacity: usize,
    /// "Still viewing" refresh while a resource page is mounted.
    pub heartbeat_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            backoff: Backoff::default(),
            inbound: InboundWindows::default(),
            outbound: OutboundWindows::default(),
            viewing_ttl_ms: 60_000,
            editing_ttl_ms: 120_000,
            activity_capacity: 50,
            notification_capacity: 100,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl PresenceConfig {
    pub fn from_config(config: &CardwatchConfig) -> Self {
        let p = &config.presence;
        Self {
            transport: TransportConfig {
                server_url: p.server_url.clone(),
                connect_timeout: Duration::from_millis(p.connect_timeout_ms),
                retries: p.transport_retries,
                retry_delay: Duration::from_millis(p.transport_retry_delay_ms),
                framing: p.framing.clone(),
            },
            backoff: Backoff {
                base_ms: config.reconnect.base_delay_ms,
                max_ms: config.reconnect.max_delay_ms,
                max_attempts: config.reconnect.max_attempts,
            },
            inbound: InboundWindows {
                roster_ms: config.inbound.roster_window_ms,
                activity_ms: config.inbound.activity_window_ms,
                activity_dedup_ms: config.inbound.activity_dedup_ms,
            },
            outbound: OutboundWindows {
                activity_ms: config.outbound.activity_window_ms,
                viewing_ms: config.outbound.viewing_window_ms,
                typing_ms: config.outbound.typing_window_ms,
                editing_ms: config.outbound.editing_window_ms,
                independent: config.outbound.independent_windows,
            },
            viewing_ttl_ms: config.staleness.viewing_ttl_ms,
            editing_ttl_ms: config.staleness.editing_ttl_ms,
            activity_capacity: config.feeds.activity_capacity,
            notification_capacity: config.feeds.notification_capacity,
            heartbeat_interval: Duration::from_secs(p.heartbeat_interval_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// `(resource, resourceId)`, e.g. `("cardholder", "123")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub resource: String,
    pub resource_id: String,
}

impl ResourceKey {
    pub fn new(resource: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource, self.resource_id)
    }
}

/// `(resource, resourceId, userId)` for typing indicators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypingKey {
    pub resource: ResourceKey,
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Stored entries
// ---------------------------------------------------------------------------

/// One participant in a viewing or editing list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorEntry {
    pub user_id: String,
    /// Free-form fields from the indicator payload.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// When this client stored the entry. `None` never expires.
    pub received_at: Option<i64>,
}

/// An entry of the notification feed. Alerts and notifications share it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub priority: String,
    pub details: Value,
    pub timestamp: i64,
}

impl Notification {
    /// Fill in what the server left out: a `timestamp-random` id, the
    /// receive time, and `default_kind` for the type.
    pub fn from_payload(payload: NotificationPayload, default_kind: &str, now_ms: i64) -> Self {
        let timestamp = payload.timestamp.unwrap_or(now_ms);
        Self {
            id: payload
                .id
                .unwrap_or_else(|| fallback_event_id(timestamp)),
            kind: payload.kind.unwrap_or_else(|| default_kind.to_string()),
            title: payload.title,
            message: payload.message,
            priority: payload.priority,
            details: payload.details,
            timestamp,
        }
    }

    /// A notice synthesized by this client rather than pushed by the server.
    pub fn local(
        title: impl Into<String>,
        message: impl Into<String>,
        priority: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            id: fallback_event_id(now_ms),
            kind: "local".into(),
            title: title.into(),
            message: message.into(),
            priority: priority.into(),
            details: Value::Null,
            timestamp: now_ms,
        }
    }
}
