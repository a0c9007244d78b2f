//! Cardwatch configuration system.
//!
//! TOML-based configuration for the presence client, relay and CLI. All
//! sections use defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cardwatch_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{CardwatchConfig, CONFIG_SCHEMA_VERSION};

use cardwatch_common::ConfigError;
use std::path::Path;

/// Load config from the platform default path and validate it.
///
/// Creates a commented default file if none exists.
pub fn load_config() -> Result<CardwatchConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path, or the default path when `None`.
pub fn load_config_from(path: Option<&Path>) -> Result<CardwatchConfig, ConfigError> {
    match path {
        Some(path) => {
            let config = toml_loader::load_from_path(path)?;
            validation::validate(&config)?;
            Ok(config)
        }
        None => load_config(),
    }
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &CardwatchConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let json = config_to_json(&CardwatchConfig::default());
        for section in [
            "presence",
            "reconnect",
            "inbound",
            "outbound",
            "staleness",
            "feeds",
            "api",
            "logging",
        ] {
            assert!(json.contains(&format!("\"{section}\"")), "missing {section}");
        }
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let json = config_to_json(&CardwatchConfig::default());
        let parsed: CardwatchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.presence.heartbeat_interval_secs, 30);
        assert_eq!(parsed.staleness.editing_ttl_ms, 120_000);
    }

    #[test]
    fn load_config_from_explicit_path_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[feeds]\nactivity_capacity = 0\n").unwrap();
        let err = load_config_from(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_config_from_explicit_path_missing() {
        let err = load_config_from(Some(Path::new("/tmp/cardwatch_missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
