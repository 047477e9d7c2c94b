// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline administration commands: enqueue, tenant management, reclaim.
//!
//! These open the queue database directly and do not need a running daemon.
//! A running daemon picks tenant changes up on its next config refresh.

use std::time::Duration;

use courier_config::validation::validate_rates;
use courier_config::{CourierConfig, render_errors};
use courier_core::{
    CourierError, EnqueueOutcome, QueueStore, RateOverride, TenantConfigSource, TenantId,
    TenantSettings,
};
use courier_dispatch::EnqueueRequest;
use courier_storage::SqliteStore;
use tracing::info;

/// Rate fields accepted by `courier tenant set`. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct RateFlags {
    pub baseline_rate: Option<f64>,
    pub burst_ceiling: Option<u32>,
    pub hard_guardrail: Option<f64>,
    pub recipient_min_gap_secs: Option<f64>,
    pub max_backoff_secs: Option<f64>,
}

impl RateFlags {
    fn apply(&self, overrides: &mut RateOverride) {
        if let Some(v) = self.baseline_rate {
            overrides.baseline_rate = Some(v);
        }
        if let Some(v) = self.burst_ceiling {
            overrides.burst_ceiling = Some(v);
        }
        if let Some(v) = self.hard_guardrail {
            overrides.hard_guardrail = Some(v);
        }
        if let Some(v) = self.recipient_min_gap_secs {
            overrides.recipient_min_gap_secs = Some(v);
        }
        if let Some(v) = self.max_backoff_secs {
            overrides.max_backoff_secs = Some(v);
        }
    }
}

/// `courier enqueue`
pub async fn enqueue(store: &SqliteStore, request: &EnqueueRequest) -> Result<EnqueueOutcome, CourierError> {
    let outcome = courier_dispatch::enqueue(store, request).await?;
    match outcome {
        EnqueueOutcome::Enqueued(id) => println!("enqueued task {id}"),
        EnqueueOutcome::Duplicate(id) => println!("duplicate idempotency key, existing task {id}"),
    }
    Ok(outcome)
}

/// `courier tenant list`
pub async fn list_tenants(store: &SqliteStore, config: &CourierConfig) -> Result<Vec<TenantSettings>, CourierError> {
    let mut tenants = store.load_tenants().await?;
    tenants.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
    if tenants.is_empty() {
        println!("no tenants configured");
    }
    for tenant in &tenants {
        let effective = config.dispatch.merged_with(&tenant.overrides);
        let depth = store.queue_depth(&tenant.tenant_id).await?;
        println!(
            "{:<24} {:<8} baseline={} burst={} guardrail={} gap={}s queued={}",
            tenant.tenant_id.0,
            if tenant.enabled { "enabled" } else { "disabled" },
            effective.baseline_rate,
            effective.burst_ceiling,
            effective.hard_guardrail,
            effective.recipient_min_gap_secs,
            depth,
        );
    }
    Ok(tenants)
}

/// `courier tenant enable|disable`
pub async fn set_enabled(store: &SqliteStore, tenant: &str, enabled: bool) -> Result<(), CourierError> {
    store.set_tenant_enabled(&TenantId::from(tenant), enabled).await?;
    info!(tenant_id = %tenant, enabled, "tenant updated");
    println!("tenant {tenant} {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

/// `courier tenant set`
///
/// Merges the flags into the stored overrides and rejects the change if the
/// resulting effective configuration would not validate.
pub async fn set_rates(
    store: &SqliteStore,
    config: &CourierConfig,
    tenant: &str,
    flags: &RateFlags,
) -> Result<TenantSettings, CourierError> {
    let tenant_id = TenantId::from(tenant);
    let mut settings = store
        .load_tenants()
        .await?
        .into_iter()
        .find(|s| s.tenant_id == tenant_id)
        .unwrap_or_else(|| TenantSettings {
            tenant_id: tenant_id.clone(),
            enabled: true,
            overrides: RateOverride::default(),
        });
    flags.apply(&mut settings.overrides);

    let mut errors = Vec::new();
    let effective = config.dispatch.merged_with(&settings.overrides);
    validate_rates(&format!("tenants.{tenant}"), &effective, &mut errors);
    if !errors.is_empty() {
        render_errors(&errors);
        return Err(CourierError::Validation(format!(
            "rejected rate settings for tenant {tenant}"
        )));
    }

    store.upsert_tenant(&settings).await?;
    info!(tenant_id = %tenant, "tenant rate settings stored");
    println!("tenant {tenant} updated");
    Ok(settings)
}

/// `courier tenant remove`
pub async fn remove(store: &SqliteStore, tenant: &str) -> Result<bool, CourierError> {
    let removed = store.delete_tenant(&TenantId::from(tenant)).await?;
    if removed {
        println!("tenant {tenant} removed");
    } else {
        println!("tenant {tenant} not found");
    }
    Ok(removed)
}

/// `courier reclaim`
pub async fn reclaim(store: &SqliteStore, older_than: Duration) -> Result<u64, CourierError> {
    let count = store.reclaim_stale(older_than).await?;
    println!("reclaimed {count} stranded task(s)");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::StorageConfig;
    use courier_core::TaskStatus;

    async fn temp_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("admin.db").display().to_string(),
            wal_mode: true,
        };
        (SqliteStore::open(&config).await.unwrap(), dir)
    }

    fn request(key: &str) -> EnqueueRequest {
        EnqueueRequest {
            tenant_id: "acme".into(),
            recipient_id: "r1".into(),
            body: "hi".into(),
            tag: None,
            priority: 0,
            idempotency_key: key.into(),
            not_before: None,
        }
    }

    #[tokio::test]
    async fn enqueue_reports_duplicates() {
        let (store, _dir) = temp_store().await;
        let first = enqueue(&store, &request("k1")).await.unwrap();
        let second = enqueue(&store, &request("k1")).await.unwrap();
        assert!(matches!(first, EnqueueOutcome::Enqueued(_)));
        assert_eq!(second, EnqueueOutcome::Duplicate(first.task_id()));
        let task = store.get_task(first.task_id()).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
    }

    #[tokio::test]
    async fn set_rates_merges_with_existing_overrides() {
        let (store, _dir) = temp_store().await;
        let config = CourierConfig::default();
        set_rates(
            &store,
            &config,
            "acme",
            &RateFlags {
                baseline_rate: Some(5.0),
                ..RateFlags::default()
            },
        )
        .await
        .unwrap();
        let settings = set_rates(
            &store,
            &config,
            "acme",
            &RateFlags {
                burst_ceiling: Some(10),
                ..RateFlags::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(settings.overrides.baseline_rate, Some(5.0));
        assert_eq!(settings.overrides.burst_ceiling, Some(10));

        let listed = list_tenants(&store, &config).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].enabled);
    }

    #[tokio::test]
    async fn set_rates_rejects_invalid_values() {
        let (store, _dir) = temp_store().await;
        let config = CourierConfig::default();
        let err = set_rates(
            &store,
            &config,
            "acme",
            &RateFlags {
                baseline_rate: Some(-1.0),
                ..RateFlags::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CourierError::Validation(_)));
        assert!(store.load_tenants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn enable_disable_and_remove() {
        let (store, _dir) = temp_store().await;
        set_enabled(&store, "acme", false).await.unwrap();
        let tenants = store.load_tenants().await.unwrap();
        assert!(!tenants[0].enabled);

        set_enabled(&store, "acme", true).await.unwrap();
        assert!(store.load_tenants().await.unwrap()[0].enabled);

        assert!(remove(&store, "acme").await.unwrap());
        assert!(!remove(&store, "acme").await.unwrap());
    }

    #[tokio::test]
    async fn reclaim_on_empty_queue_is_zero() {
        let (store, _dir) = temp_store().await;
        assert_eq!(reclaim(&store, Duration::from_secs(60)).await.unwrap(), 0);
    }
}
