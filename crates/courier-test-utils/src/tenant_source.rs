// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory tenant configuration source.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use courier_core::{CourierError, RateOverride, TenantConfigSource, TenantId, TenantSettings};

/// A tenant source whose contents tests replace at will.
///
/// Clones share state, so a test can keep one handle and give another to a
/// `ConfigProvider`.
#[derive(Clone, Default)]
pub struct StaticTenantSource {
    tenants: Arc<RwLock<Vec<TenantSettings>>>,
    failing: Arc<AtomicBool>,
}

impl StaticTenantSource {
    pub fn new(tenants: Vec<TenantSettings>) -> Self {
        Self {
            tenants: Arc::new(RwLock::new(tenants)),
            failing: Arc::default(),
        }
    }

    /// A source listing each id as enabled with no overrides.
    pub fn enabled(ids: &[&str]) -> Self {
        Self::new(ids.iter().map(|id| enabled_tenant(id)).collect())
    }

    /// Replace the whole tenant list.
    pub async fn set_tenants(&self, tenants: Vec<TenantSettings>) {
        *self.tenants.write().await = tenants;
    }

    /// Insert or replace one tenant.
    pub async fn upsert(&self, settings: TenantSettings) {
        let mut tenants = self.tenants.write().await;
        tenants.retain(|t| t.tenant_id != settings.tenant_id);
        tenants.push(settings);
    }

    /// Make subsequent loads fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

/// Settings for an enabled tenant with no overrides.
pub fn enabled_tenant(id: &str) -> TenantSettings {
    TenantSettings {
        tenant_id: TenantId::from(id),
        enabled: true,
        overrides: RateOverride::default(),
    }
}

#[async_trait]
impl TenantConfigSource for StaticTenantSource {
    async fn load_tenants(&self) -> Result<Vec<TenantSettings>, CourierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CourierError::Config("tenant source unavailable".into()));
        }
        Ok(self.tenants.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_toggle_controls_loads() {
        let source = StaticTenantSource::enabled(&["acme"]);
        assert_eq!(source.load_tenants().await.unwrap().len(), 1);

        source.set_failing(true);
        assert!(source.load_tenants().await.is_err());

        source.set_failing(false);
        source.upsert(enabled_tenant("globex")).await;
        source.upsert(enabled_tenant("acme")).await;
        assert_eq!(source.load_tenants().await.unwrap().len(), 2);
    }
}
