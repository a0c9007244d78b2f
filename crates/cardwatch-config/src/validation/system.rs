use crate::schema::CardwatchConfig;

use super::helpers::validate_range;

pub(super) fn validate_api(errors: &mut Vec<String>, config: &CardwatchConfig) {
    let a = &config.api;
    if !a.base_url.starts_with("http://") && !a.base_url.starts_with("https://") {
        errors.push(format!(
            "api.base_url = {:?} must start with http:// or https://",
            a.base_url
        ));
    }
    validate_range(
        errors,
        "api.request_timeout_secs",
        a.request_timeout_secs,
        1,
        300,
    );
}
