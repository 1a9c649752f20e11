// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, ordered delay bounds, and non-zero batch sizes.

use crate::diagnostic::ConfigError;
use crate::model::TallyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of failing fast.
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        fail("gateway.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if let Some(token) = &config.gateway.admin_token
        && token.trim().is_empty()
    {
        fail("gateway.admin_token must not be blank when set".to_string());
    }

    if let Some(secret) = &config.webhook.signing_secret
        && secret.trim().is_empty()
    {
        fail("webhook.signing_secret must not be blank when set".to_string());
    }

    if config.retry.interval_secs == 0 {
        fail("retry.interval_secs must be at least 1".to_string());
    }

    if config.retry.batch_size == 0 {
        fail("retry.batch_size must be at least 1".to_string());
    }

    if config.retry.max_retries == 0 {
        fail("retry.max_retries must be at least 1".to_string());
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        fail(format!(
            "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
            config.retry.base_delay_ms, config.retry.max_delay_ms
        ));
    }

    if config.webhook.processing_timeout_secs == 0 {
        fail("webhook.processing_timeout_secs must be at least 1".to_string());
    }

    if config.gateway.request_timeout_secs == 0 {
        fail("gateway.request_timeout_secs must be at least 1".to_string());
    } else if config.webhook.processing_timeout_secs >= config.gateway.request_timeout_secs {
        // A logged delivery must be answered before the request deadline fires.
        fail(format!(
            "webhook.processing_timeout_secs ({}) must be less than gateway.request_timeout_secs ({})",
            config.webhook.processing_timeout_secs, config.gateway.request_timeout_secs
        ));
    }

    if config.health.recent_limit == 0 {
        fail("health.recent_limit must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = TallyConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = TallyConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn inverted_delay_bounds_fail_validation() {
        let mut config = TallyConfig::default();
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_ms = 500;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "base_delay_ms"));
    }

    #[test]
    fn zero_batch_and_ceiling_report_both() {
        let mut config = TallyConfig::default();
        config.retry.batch_size = 0;
        config.retry.max_retries = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(has_error(&errors, "batch_size"));
        assert!(has_error(&errors, "max_retries"));
    }

    #[test]
    fn blank_secret_fails_validation() {
        let mut config = TallyConfig::default();
        config.webhook.signing_secret = Some("   ".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "signing_secret"));
    }

    #[test]
    fn bad_host_fails_validation() {
        let mut config = TallyConfig::default();
        config.gateway.host = "not a host!".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "gateway.host"));
    }

    #[test]
    fn zero_request_timeout_fails_validation() {
        let mut config = TallyConfig::default();
        config.gateway.request_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(has_error(&errors, "gateway.request_timeout_secs must be at least 1"));
    }

    #[test]
    fn processing_timeout_must_fit_inside_request_timeout() {
        let mut config = TallyConfig::default();
        config.webhook.processing_timeout_secs = 5;
        config.gateway.request_timeout_secs = 1;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "must be less than gateway.request_timeout_secs"));

        config.gateway.request_timeout_secs = 5;
        assert!(validate_config(&config).is_err());

        config.gateway.request_timeout_secs = 6;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = TallyConfig::default();
        config.gateway.host = "0.0.0.0".to_string();
        config.gateway.admin_token = Some("ops-token".to_string());
        config.webhook.signing_secret = Some("whsec_c2VjcmV0".to_string());
        config.storage.database_path = "/tmp/tally-test.db".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
