//! Validation for the presence connection, throttles and feeds.

use crate::schema::CardwatchConfig;

use super::helpers::{validate_range, validate_range_ms};

pub(super) fn validate_presence(errors: &mut Vec<String>, config: &CardwatchConfig) {
    let p = &config.presence;
    if p.enabled {
        if p.server_url.is_empty() {
            errors.push("presence.server_url must not be empty when enabled".into());
        } else if !p.server_url.starts_with("ws://") && !p.server_url.starts_with("wss://") {
            errors.push(format!(
                "presence.server_url = {:?} must start with ws:// or wss://",
                p.server_url
            ));
        }
    }
    validate_range(
        errors,
        "presence.connect_timeout_ms",
        p.connect_timeout_ms,
        500,
        60_000,
    );
    validate_range(
        errors,
        "presence.transport_retries",
        u64::from(p.transport_retries),
        0,
        10,
    );
    validate_range(
        errors,
        "presence.transport_retry_delay_ms",
        p.transport_retry_delay_ms,
        0,
        30_000,
    );
    validate_range(
        errors,
        "presence.heartbeat_interval_secs",
        p.heartbeat_interval_secs,
        5,
        300,
    );
    if p.framing.is_empty() {
        errors.push("presence.framing must list at least one mode".into());
    }
}

pub(super) fn validate_reconnect(errors: &mut Vec<String>, config: &CardwatchConfig) {
    let r = &config.reconnect;
    validate_range(errors, "reconnect.base_delay_ms", r.base_delay_ms, 1, 60_000);
    validate_range(errors, "reconnect.max_delay_ms", r.max_delay_ms, 1, 600_000);
    validate_range(
        errors,
        "reconnect.max_attempts",
        u64::from(r.max_attempts),
        1,
        20,
    );
    if r.max_delay_ms < r.base_delay_ms {
        errors.push(format!(
            "reconnect.max_delay_ms = {} must not be below reconnect.base_delay_ms = {}",
            r.max_delay_ms, r.base_delay_ms
        ));
    }
}

pub(super) fn validate_throttles(errors: &mut Vec<String>, config: &CardwatchConfig) {
    let i = &config.inbound;
    validate_range_ms(errors, "inbound.roster_window_ms", i.roster_window_ms, 0, 60_000);
    validate_range_ms(
        errors,
        "inbound.activity_window_ms",
        i.activity_window_ms,
        0,
        60_000,
    );
    validate_range_ms(
        errors,
        "inbound.activity_dedup_ms",
        i.activity_dedup_ms,
        0,
        300_000,
    );

    let o = &config.outbound;
    validate_range_ms(
        errors,
        "outbound.activity_window_ms",
        o.activity_window_ms,
        0,
        300_000,
    );
    validate_range_ms(
        errors,
        "outbound.viewing_window_ms",
        o.viewing_window_ms,
        0,
        300_000,
    );
    validate_range_ms(
        errors,
        "outbound.typing_window_ms",
        o.typing_window_ms,
        0,
        300_000,
    );
    validate_range_ms(
        errors,
        "outbound.editing_window_ms",
        o.editing_window_ms,
        0,
        300_000,
    );
}

pub(super) fn validate_staleness(errors: &mut Vec<String>, config: &CardwatchConfig) {
    let s = &config.staleness;
    validate_range_ms(
        errors,
        "staleness.viewing_ttl_ms",
        s.viewing_ttl_ms,
        1000,
        3_600_000,
    );
    validate_range_ms(
        errors,
        "staleness.editing_ttl_ms",
        s.editing_ttl_ms,
        1000,
        3_600_000,
    );
}

pub(super) fn validate_feeds(errors: &mut Vec<String>, config: &CardwatchConfig) {
    let f = &config.feeds;
    validate_range(
        errors,
        "feeds.activity_capacity",
        f.activity_capacity as u64,
        1,
        10_000,
    );
    validate_range(
        errors,
        "feeds.notification_capacity",
        f.notification_capacity as u64,
        1,
        10_000,
    );
}
