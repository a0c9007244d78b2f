//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Cardwatch Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[presence]
# enabled = true
# server_url = "ws://127.0.0.1:4100/presence"
# connect_timeout_ms = 5000         # 500-60000
# transport_retries = 2             # 0-10
# transport_retry_delay_ms = 500
# framing = ["text", "binary"]      # tried in order
# heartbeat_interval_secs = 30      # 5-300

[reconnect]
# base_delay_ms = 1000
# max_delay_ms = 30000
# max_attempts = 5                  # 1-20

[inbound]
# roster_window_ms = 2000
# activity_window_ms = 1000
# activity_dedup_ms = 5000

[outbound]
# activity_window_ms = 5000
# viewing_window_ms = 10000
# typing_window_ms = 3000
# editing_window_ms = 5000
# independent_windows = false       # true = one window per action

[staleness]
# viewing_ttl_ms = 60000
# editing_ttl_ms = 120000

[feeds]
# activity_capacity = 50
# notification_capacity = 100

[api]
# base_url = "http://127.0.0.1:4000/api"
# request_timeout_secs = 30         # 1-300

[logging]
# level = "INFO"                    # TRACE, DEBUG, INFO, WARNING, ERROR
# redact_secrets = true
"##
    .to_string()
}
