// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Courier configuration system.

use courier_config::diagnostic::ConfigError;
use courier_config::{TenantSourceKind, load_and_validate_str, load_config_from_str};
use courier_core::{TenantConfigSource, TenantId, TenantRateConfig};

/// A full file with every section deserializes.
#[test]
fn full_toml_deserializes() {
    let toml = r#"
[daemon]
log_level = "debug"
log_format = "json"
control_bind = "0.0.0.0:9000"
shutdown_grace_secs = 3

[storage]
database_path = "/tmp/courier-test.db"
wal_mode = false

[dispatch]
baseline_rate = 10.0
burst_ceiling = 20
hard_guardrail = 12.0
recipient_min_gap_secs = 2.0
max_backoff_secs = 120.0

[worker]
idle_poll_ms = 100
max_retries = 3
tenant_source = "file"

[provider]
base_url = "http://localhost:8089"
api_version = "v20.0"
page_tokens = { acme = "token-a" }

[tenants.acme]
baseline_rate = 4.0

[tenants.globex]
enabled = false
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.daemon.log_format, "json");
    assert_eq!(config.daemon.shutdown_grace_secs, 3);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.dispatch.burst_ceiling, 20);
    assert_eq!(config.worker.idle_poll_ms, 100);
    assert_eq!(config.worker.max_retries, 3);
    assert_eq!(config.worker.tenant_source, TenantSourceKind::File);
    assert_eq!(config.provider.api_version, "v20.0");
    assert_eq!(config.provider.page_tokens["acme"], "token-a");
    assert_eq!(config.tenants.len(), 2);
    assert_eq!(config.tenants["acme"].baseline_rate, Some(4.0));
    assert!(!config.tenants["globex"].enabled);
}

/// An empty file yields the compiled defaults.
#[test]
fn empty_toml_uses_defaults() {
    let config = load_config_from_str("").expect("empty config");
    assert_eq!(config.dispatch, TenantRateConfig::default());
    assert_eq!(config.worker.tenant_source, TenantSourceKind::Database);
    assert_eq!(config.worker.stale_claim_secs, 300);
    assert_eq!(config.provider.rate_limit_codes, vec![4, 17, 32, 613]);
    assert!(config.tenants.is_empty());
}

/// A misspelled key is reported with a suggestion and a source span.
#[test]
fn unknown_worker_key_suggests_correction() {
    let toml = "[worker]\nidle_pol_ms = 10\n";
    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            span,
            ..
        } => {
            assert_eq!(key, "idle_pol_ms");
            assert_eq!(suggestion.as_deref(), Some("idle_poll_ms"));
            assert!(span.is_some());
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// Unknown keys inside a tenant section are rejected too.
#[test]
fn unknown_tenant_key_rejected() {
    let errors = load_and_validate_str("[tenants.acme]\nburst = 3\n").unwrap_err();
    assert!(matches!(
        &errors[0],
        ConfigError::UnknownKey { key, .. } if key == "burst"
    ));
}

/// A wrongly typed value produces an InvalidType diagnostic.
#[test]
fn wrong_type_reported() {
    let errors = load_and_validate_str("[dispatch]\nburst_ceiling = \"lots\"\n").unwrap_err();
    assert!(matches!(
        &errors[0],
        ConfigError::InvalidType { key, .. } if key.contains("burst_ceiling")
    ));
}

/// An unsupported tenant source is reported with the allowed variants.
#[test]
fn unknown_tenant_source_variant() {
    let errors = load_and_validate_str("[worker]\ntenant_source = \"redis\"\n").unwrap_err();
    assert!(matches!(
        &errors[0],
        ConfigError::UnknownVariant { value, expected, .. }
            if value == "redis" && expected.contains("database")
    ));
}

/// Semantic validation runs after a successful parse.
#[test]
fn semantic_validation_runs_after_parse() {
    let errors = load_and_validate_str("[dispatch]\nbaseline_rate = -1.0\n").unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::Validation { message } if message.contains("baseline_rate")
    )));
}

/// Tenants from the file feed the config provider.
#[tokio::test]
async fn file_tenants_feed_config_provider() {
    let config = load_and_validate_str(
        "[dispatch]\nbaseline_rate = 8.0\n\n[tenants.acme]\nburst_ceiling = 3\n\n[tenants.off]\nenabled = false\n",
    )
    .unwrap();
    let source = courier_config::FileTenantSource::from_config(&config);
    assert_eq!(source.load_tenants().await.unwrap().len(), 2);

    let provider = courier_config::ConfigProvider::new(
        config.dispatch.clone(),
        std::sync::Arc::new(source),
    );
    provider.refresh().await.unwrap();

    let acme = provider.effective_config(&TenantId::from("acme"));
    assert_eq!(acme.baseline_rate, 8.0);
    assert_eq!(acme.burst_ceiling, 3);
    assert_eq!(provider.enabled_tenants(), vec![TenantId::from("acme")]);
}
