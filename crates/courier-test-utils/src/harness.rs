// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end dispatch testing.
//!
//! `TestHarness` assembles a temp SQLite queue store, a scripted
//! [`MockProvider`], an in-memory tenant source and a [`ConfigProvider`]
//! over it. Dispatch tests build loops or a supervisor from these parts.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use courier_config::model::{ProviderConfig, StorageConfig, WorkerConfig};
use courier_config::ConfigProvider;
use courier_core::{
    CourierError, NewTask, PolicyTag, QueueStore, RecipientId, TaskId, TenantId, TenantRateConfig,
    TenantSettings,
};
use courier_storage::SqliteStore;

use crate::mock_provider::{MockProvider, MockReply};
use crate::tenant_source::{StaticTenantSource, enabled_tenant};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    defaults: TenantRateConfig,
    tenants: Vec<TenantSettings>,
    replies: Vec<MockReply>,
    worker: WorkerConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            defaults: TenantRateConfig::default(),
            tenants: Vec::new(),
            replies: Vec::new(),
            worker: fast_worker_config(),
        }
    }

    /// Set the process-wide default rate config.
    pub fn with_defaults(mut self, defaults: TenantRateConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Add an enabled tenant with no overrides.
    pub fn with_tenant(mut self, id: &str) -> Self {
        self.tenants.push(enabled_tenant(id));
        self
    }

    /// Add a tenant with explicit settings.
    pub fn with_tenant_settings(mut self, settings: TenantSettings) -> Self {
        self.tenants.push(settings);
        self
    }

    /// Set scripted provider replies.
    pub fn with_replies(mut self, replies: Vec<MockReply>) -> Self {
        self.replies = replies;
        self
    }

    /// Override the worker timings.
    pub fn with_worker_config(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Build the harness: open the temp database and load the tenant snapshot.
    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| CourierError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let storage_config = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        };
        let store = Arc::new(SqliteStore::open(&storage_config).await?);

        let tenants = StaticTenantSource::new(self.tenants);
        let config = Arc::new(ConfigProvider::new(
            self.defaults,
            Arc::new(tenants.clone()),
        ));
        config.refresh().await?;

        let provider = Arc::new(MockProvider::with_replies(self.replies));

        Ok(TestHarness {
            store,
            provider,
            tenants,
            config,
            worker: self.worker,
            provider_config: ProviderConfig::default(),
            _temp_dir: temp_dir,
        })
    }
}

/// Worker timings shortened so loops react within milliseconds.
pub fn fast_worker_config() -> WorkerConfig {
    WorkerConfig {
        idle_poll_ms: 10,
        throttle_retry_ms: 10,
        send_timeout_secs: 2,
        health_check_secs: 1,
        metrics_interval_secs: 1,
        ..WorkerConfig::default()
    }
}

/// A dispatch test environment with mock adapters and temp storage.
pub struct TestHarness {
    /// SQLite queue store (temp DB, removed on drop).
    pub store: Arc<SqliteStore>,
    /// The scripted provider.
    pub provider: Arc<MockProvider>,
    /// Tenant source backing `config`.
    pub tenants: StaticTenantSource,
    /// Live tenant configuration.
    pub config: Arc<ConfigProvider>,
    pub worker: WorkerConfig,
    pub provider_config: ProviderConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Enqueue an untagged, priority-0 task for a recipient seen just now.
    pub async fn enqueue(
        &self,
        tenant: &str,
        recipient: &str,
        key: &str,
    ) -> Result<TaskId, CourierError> {
        let task = new_task(tenant, recipient, key);
        self.store
            .record_inbound(&task.tenant_id, &task.recipient_id, Utc::now())
            .await?;
        self.store.enqueue(&task).await
    }

    /// Enqueue a task exactly as given, without touching recipient activity.
    pub async fn enqueue_task(&self, task: &NewTask) -> Result<TaskId, CourierError> {
        self.store.enqueue(task).await
    }

    /// Record that the recipient last wrote to the tenant at `at`.
    pub async fn record_inbound(
        &self,
        tenant: &str,
        recipient: &str,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        self.store
            .record_inbound(&TenantId::from(tenant), &RecipientId::from(recipient), at)
            .await
    }
}

/// An untagged priority-0 task due immediately.
pub fn new_task(tenant: &str, recipient: &str, key: &str) -> NewTask {
    NewTask {
        tenant_id: TenantId::from(tenant),
        recipient_id: RecipientId::from(recipient),
        body: format!("message {key}"),
        policy_tag: None,
        priority: 0,
        idempotency_key: key.to_string(),
        not_before: None,
    }
}

/// Like [`new_task`] but carrying a policy tag.
pub fn tagged_task(tenant: &str, recipient: &str, key: &str, tag: PolicyTag) -> NewTask {
    NewTask {
        policy_tag: Some(tag),
        ..new_task(tenant, recipient, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::TaskStatus;

    #[tokio::test]
    async fn harness_builds_with_enabled_tenant() {
        let harness = TestHarness::builder()
            .with_tenant("acme")
            .build()
            .await
            .unwrap();
        assert!(harness.config.is_enabled(&TenantId::from("acme")));

        let id = harness.enqueue("acme", "r1", "k1").await.unwrap();
        let task = harness.store.get_task(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert!(
            harness
                .store
                .last_inbound(&TenantId::from("acme"), &RecipientId::from("r1"))
                .await
                .unwrap()
                .is_some()
        );
    }
}
