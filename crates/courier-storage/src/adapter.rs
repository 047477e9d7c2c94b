// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the queue store and tenant source traits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use courier_config::model::StorageConfig;
use courier_core::{
    AdapterType, CourierError, HealthStatus, MessageTask, NewTask, PluginAdapter, QueueStore,
    RecipientId, StatusCounts, TaskId, TaskStatus, TenantConfigSource, TenantId, TenantSettings,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed queue store.
///
/// Wraps a [`Database`] handle and delegates every operation to the typed
/// query modules, stamping them with the current wall-clock time.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Opens the database named by the storage config.
    pub async fn open(config: &StorageConfig) -> Result<Self, CourierError> {
        let db = Database::open_with(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite queue store opened");
        Ok(Self { db })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Insert or replace a tenant row.
    pub async fn upsert_tenant(&self, settings: &TenantSettings) -> Result<(), CourierError> {
        queries::tenants::upsert_tenant(&self.db, settings, Utc::now()).await
    }

    /// Enable or disable a tenant, creating it if unknown.
    pub async fn set_tenant_enabled(
        &self,
        tenant: &TenantId,
        enabled: bool,
    ) -> Result<(), CourierError> {
        queries::tenants::set_enabled(&self.db, tenant, enabled, Utc::now()).await
    }

    pub async fn delete_tenant(&self, tenant: &TenantId) -> Result<bool, CourierError> {
        queries::tenants::delete_tenant(&self.db, tenant).await
    }

    /// Checkpoints the WAL so the database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), CourierError> {
        self.db.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoints and closes the connection.
    pub async fn close(self) -> Result<(), CourierError> {
        self.db.close().await
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn enqueue(&self, task: &NewTask) -> Result<TaskId, CourierError> {
        queries::tasks::enqueue(&self.db, task, Utc::now()).await
    }

    async fn claim_next(&self, tenant: &TenantId) -> Result<Option<MessageTask>, CourierError> {
        queries::tasks::claim_next(&self.db, tenant, Utc::now()).await
    }

    async fn mark_terminal(
        &self,
        id: TaskId,
        status: TaskStatus,
        error_message: Option<&str>,
        provider_message_id: Option<&str>,
    ) -> Result<(), CourierError> {
        queries::tasks::mark_terminal(
            &self.db,
            id,
            status,
            error_message,
            provider_message_id,
            Utc::now(),
        )
        .await
    }

    async fn requeue(
        &self,
        id: TaskId,
        delay: Duration,
        error_message: Option<&str>,
    ) -> Result<(), CourierError> {
        queries::tasks::requeue(&self.db, id, delay, error_message, Utc::now()).await
    }

    async fn release(&self, id: TaskId) -> Result<(), CourierError> {
        queries::tasks::release(&self.db, id, Utc::now()).await
    }

    async fn touch_claim(&self, id: TaskId) -> Result<bool, CourierError> {
        queries::tasks::touch_claim(&self.db, id, Utc::now()).await
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, CourierError> {
        queries::tasks::reclaim_stale(&self.db, older_than, Utc::now()).await
    }

    async fn queue_depth(&self, tenant: &TenantId) -> Result<u64, CourierError> {
        queries::tasks::queue_depth(&self.db, tenant).await
    }

    async fn status_counts(&self, tenant: &TenantId) -> Result<StatusCounts, CourierError> {
        queries::tasks::status_counts(&self.db, tenant).await
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<MessageTask>, CourierError> {
        queries::tasks::get_task(&self.db, id).await
    }

    async fn record_inbound(
        &self,
        tenant: &TenantId,
        recipient: &RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        queries::activity::record_inbound(&self.db, tenant, recipient, at).await
    }

    async fn last_inbound(
        &self,
        tenant: &TenantId,
        recipient: &RecipientId,
    ) -> Result<Option<DateTime<Utc>>, CourierError> {
        queries::activity::last_inbound(&self.db, tenant, recipient).await
    }
}

#[async_trait]
impl TenantConfigSource for SqliteStore {
    async fn load_tenants(&self) -> Result<Vec<TenantSettings>, CourierError> {
        queries::tenants::list_tenants(&self.db).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn identifies_as_queue_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("id.db");
        let store = SqliteStore::open(&make_config(db_path.to_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.adapter_type(), AdapterType::Queue);
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn tenant_rows_feed_the_tenant_source() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("tenants.db");
        let store = SqliteStore::open(&make_config(db_path.to_str().unwrap()))
            .await
            .unwrap();
        store
            .set_tenant_enabled(&TenantId::from("acme"), true)
            .await
            .unwrap();
        let tenants = store.load_tenants().await.unwrap();
        assert_eq!(tenants.len(), 1);
        assert!(tenants[0].enabled);
        store.checkpoint().await.unwrap();
    }
}
