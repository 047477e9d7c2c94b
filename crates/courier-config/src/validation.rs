// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive rates, parseable bind addresses, and non-empty paths.

use courier_core::types::{MAX_RATE_DURATION_SECS, TenantRateConfig};

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !matches!(
        config.daemon.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ConfigError::Validation {
            message: format!(
                "daemon.log_level must be one of trace, debug, info, warn, error; got `{}`",
                config.daemon.log_level
            ),
        });
    }

    if !matches!(config.daemon.log_format.as_str(), "text" | "json") {
        errors.push(ConfigError::Validation {
            message: format!(
                "daemon.log_format must be `text` or `json`, got `{}`",
                config.daemon.log_format
            ),
        });
    }

    if config
        .daemon
        .control_bind
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "daemon.control_bind `{}` is not a valid socket address",
                config.daemon.control_bind
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    validate_rates("dispatch", &config.dispatch, &mut errors);

    for (tenant, entry) in &config.tenants {
        if tenant.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: "tenant ids in [tenants] must not be empty".to_string(),
            });
        }
        let effective = config.dispatch.merged_with(&entry.to_settings(tenant).overrides);
        validate_rates(&format!("tenants.{tenant}"), &effective, &mut errors);
    }

    let worker = &config.worker;
    for (name, value) in [
        ("idle_poll_ms", worker.idle_poll_ms),
        ("throttle_retry_ms", worker.throttle_retry_ms),
        ("send_timeout_secs", worker.send_timeout_secs),
        ("config_refresh_secs", worker.config_refresh_secs),
        ("metrics_interval_secs", worker.metrics_interval_secs),
        ("health_check_secs", worker.health_check_secs),
        ("reclaim_interval_secs", worker.reclaim_interval_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("worker.{name} must be greater than zero"),
            });
        }
    }

    if worker.stale_claim_secs <= worker.send_timeout_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "worker.stale_claim_secs ({}) must exceed worker.send_timeout_secs ({})",
                worker.stale_claim_secs, worker.send_timeout_secs
            ),
        });
    }

    if config.provider.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "provider.base_url must not be empty".to_string(),
        });
    }

    if config.provider.connect_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "provider.connect_timeout_secs must be greater than zero".to_string(),
        });
    }

    for code in &config.provider.rate_limit_codes {
        if config.provider.policy_codes.contains(code) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "provider error code {code} is listed in both rate_limit_codes and policy_codes"
                ),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Checks one rate section, appending a diagnostic per bad field.
pub fn validate_rates(section: &str, rates: &TenantRateConfig, errors: &mut Vec<ConfigError>) {
    if !(rates.baseline_rate.is_finite() && rates.baseline_rate > 0.0) {
        errors.push(ConfigError::Validation {
            message: format!(
                "{section}.baseline_rate must be positive, got {}",
                rates.baseline_rate
            ),
        });
    }
    if !(rates.hard_guardrail.is_finite() && rates.hard_guardrail >= 1.0) {
        errors.push(ConfigError::Validation {
            message: format!(
                "{section}.hard_guardrail must be at least 1, got {}",
                rates.hard_guardrail
            ),
        });
    }
    if rates.burst_ceiling == 0 {
        errors.push(ConfigError::Validation {
            message: format!("{section}.burst_ceiling must be at least 1"),
        });
    }
    if !(0.0..=MAX_RATE_DURATION_SECS).contains(&rates.recipient_min_gap_secs) {
        errors.push(ConfigError::Validation {
            message: format!(
                "{section}.recipient_min_gap_secs must be between 0 and {MAX_RATE_DURATION_SECS}, got {}",
                rates.recipient_min_gap_secs
            ),
        });
    }
    if !(1.0..=MAX_RATE_DURATION_SECS).contains(&rates.max_backoff_secs) {
        errors.push(ConfigError::Validation {
            message: format!(
                "{section}.max_backoff_secs must be between 1 and {MAX_RATE_DURATION_SECS}, got {}",
                rates.max_backoff_secs
            ),
        });
    }
}
