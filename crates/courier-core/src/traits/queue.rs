// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable queue store trait.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    MessageTask, NewTask, RecipientId, StatusCounts, TaskId, TaskStatus, TenantId,
};

/// Persistent storage for message tasks.
///
/// `claim_next` is the only operation that needs cross-worker exclusivity:
/// an implementation must guarantee that a `queued` row is handed to at most
/// one caller.
#[async_trait]
pub trait QueueStore: PluginAdapter {
    /// Inserts a task with status `queued`.
    ///
    /// Returns [`CourierError::DuplicateKey`] if the tenant already has a task
    /// with the same idempotency key.
    async fn enqueue(&self, task: &NewTask) -> Result<TaskId, CourierError>;

    /// Atomically claims the next eligible task for the tenant and moves it to
    /// `sending`. Eligible means `queued` with `not_before <= now`; ordering is
    /// priority descending, then creation time ascending.
    async fn claim_next(&self, tenant: &TenantId) -> Result<Option<MessageTask>, CourierError>;

    /// Moves a `sending` task to a terminal status.
    async fn mark_terminal(
        &self,
        id: TaskId,
        status: TaskStatus,
        error_message: Option<&str>,
        provider_message_id: Option<&str>,
    ) -> Result<(), CourierError>;

    /// Returns a `sending` task to `queued` with `not_before = now + delay` and
    /// an incremented retry count.
    async fn requeue(
        &self,
        id: TaskId,
        delay: Duration,
        error_message: Option<&str>,
    ) -> Result<(), CourierError>;

    /// Returns a `sending` task to `queued` untouched: same retry count, same
    /// `not_before`. Used when a claim cannot be serviced right away.
    async fn release(&self, id: TaskId) -> Result<(), CourierError>;

    /// Renews the claim on a `sending` task so the reclaim sweep leaves it
    /// alone. Returns `false` if the task is no longer `sending`.
    async fn touch_claim(&self, id: TaskId) -> Result<bool, CourierError>;

    /// Returns every task claimed longer than `older_than` ago to `queued`.
    async fn reclaim_stale(&self, older_than: Duration) -> Result<u64, CourierError>;

    /// Number of `queued` tasks for the tenant, eligible or scheduled.
    async fn queue_depth(&self, tenant: &TenantId) -> Result<u64, CourierError>;

    /// Per-status counts for the tenant.
    async fn status_counts(&self, tenant: &TenantId) -> Result<StatusCounts, CourierError>;

    /// Looks a task up by id.
    async fn get_task(&self, id: TaskId) -> Result<Option<MessageTask>, CourierError>;

    /// Records that the recipient messaged the tenant at `at`.
    ///
    /// Fed by inbound webhook ingestion; defines the free-messaging window.
    async fn record_inbound(
        &self,
        tenant: &TenantId,
        recipient: &RecipientId,
        at: DateTime<Utc>,
    ) -> Result<(), CourierError>;

    /// Last time the recipient messaged the tenant, if ever.
    async fn last_inbound(
        &self,
        tenant: &TenantId,
        recipient: &RecipientId,
    ) -> Result<Option<DateTime<Utc>>, CourierError>;
}
