//! Configuration schema types for Cardwatch.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults the presence layer was
//! tuned with.

mod presence;
mod system;
mod throttle;

pub use presence::*;
pub use system::*;
pub use throttle::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Cardwatch.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct CardwatchConfig {
    pub presence: PresenceConfig,
    pub reconnect: ReconnectConfig,
    pub inbound: InboundThrottleConfig,
    pub outbound: OutboundThrottleConfig,
    pub staleness: StalenessConfig,
    pub feeds: FeedsConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_correct_presence() {
        let config = CardwatchConfig::default();
        assert!(config.presence.enabled);
        assert_eq!(config.presence.server_url, "ws://127.0.0.1:4100/presence");
        assert_eq!(config.presence.connect_timeout_ms, 5000);
        assert_eq!(config.presence.transport_retries, 2);
        assert_eq!(
            config.presence.framing,
            vec![FramingMode::Text, FramingMode::Binary]
        );
        assert_eq!(config.presence.heartbeat_interval_secs, 30);
    }

    #[test]
    fn default_config_has_correct_reconnect() {
        let config = CardwatchConfig::default();
        assert_eq!(config.reconnect.base_delay_ms, 1000);
        assert_eq!(config.reconnect.max_delay_ms, 30_000);
        assert_eq!(config.reconnect.max_attempts, 5);
    }

    #[test]
    fn default_config_has_correct_throttles() {
        let config = CardwatchConfig::default();
        assert_eq!(config.inbound.roster_window_ms, 2000);
        assert_eq!(config.inbound.activity_window_ms, 1000);
        assert_eq!(config.inbound.activity_dedup_ms, 5000);
        assert_eq!(config.outbound.activity_window_ms, 5000);
        assert_eq!(config.outbound.viewing_window_ms, 10_000);
        assert_eq!(config.outbound.typing_window_ms, 3000);
        assert_eq!(config.outbound.editing_window_ms, 5000);
        assert!(!config.outbound.independent_windows);
    }

    #[test]
    fn default_config_has_correct_staleness_and_feeds() {
        let config = CardwatchConfig::default();
        assert_eq!(config.staleness.viewing_ttl_ms, 60_000);
        assert_eq!(config.staleness.editing_ttl_ms, 120_000);
        assert_eq!(config.feeds.activity_capacity, 50);
        assert_eq!(config.feeds.notification_capacity, 100);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: CardwatchConfig = toml::from_str(
            r#"
[outbound]
independent_windows = true

[presence]
framing = ["binary"]
"#,
        )
        .unwrap();
        assert!(config.outbound.independent_windows);
        assert_eq!(config.outbound.viewing_window_ms, 10_000);
        assert_eq!(config.presence.framing, vec![FramingMode::Binary]);
        assert_eq!(config.presence.connect_timeout_ms, 5000);
    }

    #[test]
    fn log_level_parses_uppercase() {
        let config: CardwatchConfig = toml::from_str("[logging]\nlevel = \"DEBUG\"\n").unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.level.as_directive(), "debug");
    }
}
