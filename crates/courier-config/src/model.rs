// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier dispatcher.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use courier_core::types::{RateOverride, TenantId, TenantRateConfig, TenantSettings};
use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Process-level settings (logging, control surface).
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Default rate parameters applied to every tenant.
    #[serde(default)]
    pub dispatch: TenantRateConfig,

    /// Dispatch loop and supervisor timings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Messaging provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Per-tenant overrides, keyed by tenant id.
    #[serde(default)]
    pub tenants: BTreeMap<String, TenantEntry>,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format: `text` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Address the control surface listens on.
    #[serde(default = "default_control_bind")]
    pub control_bind: String,

    /// Seconds to wait for dispatch loops to finish on shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            control_bind: default_control_bind(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_control_bind() -> String {
    "127.0.0.1:8640".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courier.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Where tenant settings are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantSourceKind {
    /// The `tenant_settings` table in the queue database.
    Database,
    /// The `[tenants.<id>]` sections of this file.
    File,
}

/// Dispatch loop and supervisor timings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Sleep when a tenant's queue has nothing eligible, in milliseconds.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Sleep after the token bucket refused a claimed task, in milliseconds.
    #[serde(default = "default_throttle_retry_ms")]
    pub throttle_retry_ms: u64,

    /// Timeout for a single provider call, in seconds.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,

    /// Generic failures are retried until the retry count reaches this value.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Requeue delay after a provider rate-limit rejection, in seconds.
    #[serde(default = "default_rate_limit_requeue_secs")]
    pub rate_limit_requeue_secs: u64,

    /// Hours after the recipient's last inbound message during which untagged
    /// messages are allowed.
    #[serde(default = "default_policy_window_hours")]
    pub policy_window_hours: u64,

    /// Interval between tenant configuration refreshes, in seconds.
    #[serde(default = "default_config_refresh_secs")]
    pub config_refresh_secs: u64,

    /// Interval between metrics emissions, in seconds.
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,

    /// Interval between supervisor health checks, in seconds.
    #[serde(default = "default_health_check_secs")]
    pub health_check_secs: u64,

    /// Interval between stale-claim sweeps, in seconds.
    #[serde(default = "default_reclaim_interval_secs")]
    pub reclaim_interval_secs: u64,

    /// A task claimed longer ago than this is considered stranded, in seconds.
    #[serde(default = "default_stale_claim_secs")]
    pub stale_claim_secs: u64,

    /// Source of per-tenant settings.
    #[serde(default = "default_tenant_source")]
    pub tenant_source: TenantSourceKind,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_poll_ms: default_idle_poll_ms(),
            throttle_retry_ms: default_throttle_retry_ms(),
            send_timeout_secs: default_send_timeout_secs(),
            max_retries: default_max_retries(),
            rate_limit_requeue_secs: default_rate_limit_requeue_secs(),
            policy_window_hours: default_policy_window_hours(),
            config_refresh_secs: default_config_refresh_secs(),
            metrics_interval_secs: default_metrics_interval_secs(),
            health_check_secs: default_health_check_secs(),
            reclaim_interval_secs: default_reclaim_interval_secs(),
            stale_claim_secs: default_stale_claim_secs(),
            tenant_source: default_tenant_source(),
        }
    }
}

impl WorkerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn throttle_retry(&self) -> Duration {
        Duration::from_millis(self.throttle_retry_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn rate_limit_requeue(&self) -> Duration {
        Duration::from_secs(self.rate_limit_requeue_secs)
    }

    pub fn policy_window(&self) -> Duration {
        Duration::from_secs(self.policy_window_hours * 3600)
    }

    pub fn config_refresh(&self) -> Duration {
        Duration::from_secs(self.config_refresh_secs)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }

    pub fn health_check(&self) -> Duration {
        Duration::from_secs(self.health_check_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    pub fn stale_claim(&self) -> Duration {
        Duration::from_secs(self.stale_claim_secs)
    }
}

fn default_idle_poll_ms() -> u64 {
    250
}

fn default_throttle_retry_ms() -> u64 {
    100
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_rate_limit_requeue_secs() -> u64 {
    5
}

fn default_policy_window_hours() -> u64 {
    24
}

fn default_config_refresh_secs() -> u64 {
    30
}

fn default_metrics_interval_secs() -> u64 {
    15
}

fn default_health_check_secs() -> u64 {
    10
}

fn default_reclaim_interval_secs() -> u64 {
    60
}

fn default_stale_claim_secs() -> u64 {
    300
}

fn default_tenant_source() -> TenantSourceKind {
    TenantSourceKind::Database
}

/// Messaging provider configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the platform's Graph API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API version path segment.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// TCP connect timeout for the HTTP client, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Error codes meaning "too many requests".
    #[serde(default = "default_rate_limit_codes")]
    pub rate_limit_codes: Vec<i64>,

    /// Error codes meaning the recipient cannot be messaged (window/tag).
    #[serde(default = "default_policy_codes")]
    pub policy_codes: Vec<i64>,

    /// Error subcodes meaning the recipient cannot be messaged, whatever the code.
    #[serde(default = "default_policy_subcodes")]
    pub policy_subcodes: Vec<i64>,

    /// Page access token per tenant id.
    #[serde(default)]
    pub page_tokens: BTreeMap<String, String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_version: default_api_version(),
            connect_timeout_secs: default_connect_timeout_secs(),
            rate_limit_codes: default_rate_limit_codes(),
            policy_codes: default_policy_codes(),
            policy_subcodes: default_policy_subcodes(),
            page_tokens: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("rate_limit_codes", &self.rate_limit_codes)
            .field("policy_codes", &self.policy_codes)
            .field("policy_subcodes", &self.policy_subcodes)
            .field("page_tokens", &format!("<{} redacted>", self.page_tokens.len()))
            .finish()
    }
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v19.0".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_rate_limit_codes() -> Vec<i64> {
    vec![4, 17, 32, 613]
}

fn default_policy_codes() -> Vec<i64> {
    vec![10, 551]
}

fn default_policy_subcodes() -> Vec<i64> {
    vec![2018278, 2018108, 1545041]
}

/// A `[tenants.<id>]` section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TenantEntry {
    #[serde(default = "default_tenant_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub baseline_rate: Option<f64>,
    #[serde(default)]
    pub burst_ceiling: Option<u32>,
    #[serde(default)]
    pub hard_guardrail: Option<f64>,
    #[serde(default)]
    pub recipient_min_gap_secs: Option<f64>,
    #[serde(default)]
    pub max_backoff_secs: Option<f64>,
}

fn default_tenant_enabled() -> bool {
    true
}

impl TenantEntry {
    pub fn to_settings(&self, tenant_id: &str) -> TenantSettings {
        TenantSettings {
            tenant_id: TenantId(tenant_id.to_string()),
            enabled: self.enabled,
            overrides: RateOverride {
                baseline_rate: self.baseline_rate,
                burst_ceiling: self.burst_ceiling,
                hard_guardrail: self.hard_guardrail,
                recipient_min_gap_secs: self.recipient_min_gap_secs,
                max_backoff_secs: self.max_backoff_secs,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_debug_redacts_tokens() {
        let mut provider = ProviderConfig::default();
        provider
            .page_tokens
            .insert("page-1".into(), "EAAB-secret".into());
        let rendered = format!("{provider:?}");
        assert!(!rendered.contains("EAAB-secret"));
        assert!(rendered.contains("<1 redacted>"));
    }

    #[test]
    fn tenant_entry_maps_to_settings() {
        let entry: TenantEntry = toml::from_str("baseline_rate = 3.5\nenabled = false").unwrap();
        let settings = entry.to_settings("acme");
        assert_eq!(settings.tenant_id, TenantId("acme".into()));
        assert!(!settings.enabled);
        assert_eq!(settings.overrides.baseline_rate, Some(3.5));
        assert_eq!(settings.overrides.burst_ceiling, None);
    }

    #[test]
    fn worker_durations() {
        let worker = WorkerConfig::default();
        assert_eq!(worker.idle_poll(), Duration::from_millis(250));
        assert_eq!(worker.policy_window(), Duration::from_secs(24 * 3600));
        assert_eq!(worker.rate_limit_requeue(), Duration::from_secs(5));
    }
}
