//! Full configuration validation.
//!
//! Each domain has its own submodule; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;
mod presence;
mod system;


use crate::schema::CardwatchConfig;
use cardwatch_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &CardwatchConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    presence::validate_presence(&mut errors, config);
    presence::validate_reconnect(&mut errors, config);
    presence::validate_throttles(&mut errors, config);
    presence::validate_staleness(&mut errors, config);
    presence::validate_feeds(&mut errors, config);
    system::validate_api(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
