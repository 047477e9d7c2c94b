// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live tenant configuration.
//!
//! [`ConfigProvider`] holds an atomically swapped snapshot of every tenant's
//! settings. Readers never block; a refresh builds a new snapshot from the
//! [`TenantConfigSource`] and swaps it in. When the source fails the previous
//! snapshot stays in place.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use courier_core::{CourierError, TenantConfigSource, TenantId, TenantRateConfig, TenantSettings};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Snapshot {
    tenants: HashMap<TenantId, TenantSettings>,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Shared handle to process defaults merged with per-tenant settings.
pub struct ConfigProvider {
    defaults: TenantRateConfig,
    source: Arc<dyn TenantConfigSource>,
    snapshot: ArcSwap<Snapshot>,
}

impl ConfigProvider {
    /// Creates a provider with an empty snapshot. Call [`refresh`](Self::refresh)
    /// before serving.
    pub fn new(defaults: TenantRateConfig, source: Arc<dyn TenantConfigSource>) -> Self {
        Self {
            defaults,
            source,
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    /// Reloads tenant settings from the source.
    ///
    /// Returns the number of tenants loaded. On error the last-known snapshot
    /// is kept and the error is returned to the caller.
    pub async fn refresh(&self) -> Result<usize, CourierError> {
        match self.source.load_tenants().await {
            Ok(list) => {
                let count = list.len();
                let tenants = list
                    .into_iter()
                    .map(|s| (s.tenant_id.clone(), s))
                    .collect();
                self.snapshot.store(Arc::new(Snapshot {
                    tenants,
                    refreshed_at: Some(Utc::now()),
                }));
                debug!(tenants = count, "tenant configuration refreshed");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "tenant configuration refresh failed, keeping last-known values");
                Err(e)
            }
        }
    }

    /// Effective rate parameters for `tenant`.
    ///
    /// Unknown tenants get the defaults with `enabled = false`.
    pub fn effective_config(&self, tenant: &TenantId) -> TenantRateConfig {
        let snapshot = self.snapshot.load();
        match snapshot.tenants.get(tenant) {
            Some(settings) => {
                let mut merged = self.defaults.merged_with(&settings.overrides);
                merged.enabled = self.defaults.enabled && settings.enabled;
                merged
            }
            None => TenantRateConfig {
                enabled: false,
                ..self.defaults.clone()
            },
        }
    }

    /// Tenants whose effective configuration is enabled, sorted by id.
    pub fn enabled_tenants(&self) -> Vec<TenantId> {
        if !self.defaults.enabled {
            return Vec::new();
        }
        let snapshot = self.snapshot.load();
        let mut ids: Vec<TenantId> = snapshot
            .tenants
            .values()
            .filter(|s| s.enabled)
            .map(|s| s.tenant_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_enabled(&self, tenant: &TenantId) -> bool {
        self.effective_config(tenant).enabled
    }

    pub fn defaults(&self) -> &TenantRateConfig {
        &self.defaults
    }

    /// When the snapshot was last replaced, `None` before the first success.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.snapshot.load().refreshed_at
    }

    /// Spawns a task refreshing every `interval` until `cancel` fires.
    pub fn spawn_refresher(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; callers refresh before spawning.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("config refresher stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let _ = provider.refresh().await;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("defaults", &self.defaults)
            .field("tenants", &self.snapshot.load().tenants.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use courier_core::RateOverride;
    use std::sync::Mutex;

    /// Source whose answer can be swapped between calls.
    struct Scripted(Mutex<Result<Vec<TenantSettings>, String>>);

    #[async_trait]
    impl TenantConfigSource for Scripted {
        async fn load_tenants(&self) -> Result<Vec<TenantSettings>, CourierError> {
            self.0
                .lock()
                .unwrap()
                .clone()
                .map_err(CourierError::Config)
        }
    }

    fn tenant(id: &str, enabled: bool, rate: Option<f64>) -> TenantSettings {
        TenantSettings {
            tenant_id: TenantId::from(id),
            enabled,
            overrides: RateOverride {
                baseline_rate: rate,
                ..RateOverride::default()
            },
        }
    }

    #[tokio::test]
    async fn merges_overrides_and_lists_enabled() {
        let source = Arc::new(Scripted(Mutex::new(Ok(vec![
            tenant("b", true, Some(2.0)),
            tenant("a", true, None),
            tenant("c", false, None),
        ]))));
        let provider = ConfigProvider::new(TenantRateConfig::default(), source);
        assert_eq!(provider.refresh().await.unwrap(), 3);

        let b = provider.effective_config(&TenantId::from("b"));
        assert_eq!(b.baseline_rate, 2.0);
        assert_eq!(b.burst_ceiling, 40);
        assert!(b.enabled);
        assert!(!provider.is_enabled(&TenantId::from("c")));
        assert_eq!(
            provider.enabled_tenants(),
            vec![TenantId::from("a"), TenantId::from("b")]
        );
    }

    #[tokio::test]
    async fn unknown_tenant_is_disabled_with_defaults() {
        let source = Arc::new(Scripted(Mutex::new(Ok(vec![]))));
        let provider = ConfigProvider::new(TenantRateConfig::default(), source);
        provider.refresh().await.unwrap();
        let cfg = provider.effective_config(&TenantId::from("ghost"));
        assert!(!cfg.enabled);
        assert_eq!(cfg.baseline_rate, 20.0);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_last_known_values() {
        let source = Arc::new(Scripted(Mutex::new(Ok(vec![tenant("a", true, Some(7.0))]))));
        let provider = ConfigProvider::new(TenantRateConfig::default(), source.clone());
        provider.refresh().await.unwrap();
        let first = provider.last_refresh();

        *source.0.lock().unwrap() = Err("database locked".into());
        assert!(provider.refresh().await.is_err());
        assert_eq!(
            provider.effective_config(&TenantId::from("a")).baseline_rate,
            7.0
        );
        assert_eq!(provider.last_refresh(), first);
    }

    #[tokio::test]
    async fn globally_disabled_defaults_disable_everyone() {
        let source = Arc::new(Scripted(Mutex::new(Ok(vec![tenant("a", true, None)]))));
        let defaults = TenantRateConfig {
            enabled: false,
            ..TenantRateConfig::default()
        };
        let provider = ConfigProvider::new(defaults, source);
        provider.refresh().await.unwrap();
        assert!(provider.enabled_tenants().is_empty());
        assert!(!provider.is_enabled(&TenantId::from("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn refresher_picks_up_changes() {
        let source = Arc::new(Scripted(Mutex::new(Ok(vec![]))));
        let provider = Arc::new(ConfigProvider::new(
            TenantRateConfig::default(),
            source.clone(),
        ));
        provider.refresh().await.unwrap();
        let cancel = CancellationToken::new();
        let handle = provider.spawn_refresher(Duration::from_secs(30), cancel.clone());

        *source.0.lock().unwrap() = Ok(vec![tenant("late", true, None)]);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(provider.enabled_tenants(), vec![TenantId::from("late")]);

        cancel.cancel();
        handle.await.unwrap();
    }
}
