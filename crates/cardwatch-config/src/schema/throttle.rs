//! Throttle windows, staleness TTLs and feed capacities.

use serde::{Deserialize, Serialize};

/// Windows applied to server-pushed events before they reach the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundThrottleConfig {
    pub roster_window_ms: i64,
    pub activity_window_ms: i64,
    pub activity_dedup_ms: i64,
}

impl Default for InboundThrottleConfig {
    fn default() -> Self {
        Self {
            roster_window_ms: 2000,
            activity_window_ms: 1000,
            activity_dedup_ms: 5000,
        }
    }
}

/// Windows applied to client-initiated events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboundThrottleConfig {
    pub activity_window_ms: i64,
    pub viewing_window_ms: i64,
    pub typing_window_ms: i64,
    pub editing_window_ms: i64,
    /// Give each action its own timestamp instead of the shared one.
    pub independent_windows: bool,
}

impl Default for OutboundThrottleConfig {
    fn default() -> Self {
        Self {
            activity_window_ms: 5000,
            viewing_window_ms: 10_000,
            typing_window_ms: 3000,
            editing_window_ms: 5000,
            independent_windows: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    pub viewing_ttl_ms: i64,
    pub editing_ttl_ms: i64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            viewing_ttl_ms: 60_000,
            editing_ttl_ms: 120_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub activity_capacity: usize,
    pub notification_capacity: usize,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            activity_capacity: 50,
            notification_capacity: 100,
        }
    }
}
