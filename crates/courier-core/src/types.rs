// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the queue store, the dispatch engine, and the
//! configuration layer.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a tenant (one connected page/account).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        TenantId(s.to_string())
    }
}

/// Platform-scoped identifier of a message recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(pub String);

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecipientId {
    fn from(s: &str) -> Self {
        RecipientId(s.to_string())
    }
}

/// Row identifier of a queued message task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role an adapter plays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Queue,
    Provider,
    Observability,
}

/// Lifecycle state of a message task.
///
/// `Queued` is both the initial state and the state a task returns to after
/// a retryable failure. `Sent`, `Failed` and `BlockedPolicy` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Sending,
    Sent,
    Failed,
    BlockedPolicy,
}

impl TaskStatus {
    /// Returns true for statuses a task never leaves.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Sent | TaskStatus::Failed | TaskStatus::BlockedPolicy
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Queued, TaskStatus::Sending) => true,
            (TaskStatus::Sending, TaskStatus::Queued) => true,
            (TaskStatus::Sending, s) => s.is_terminal(),
            _ => false,
        }
    }
}

/// Message tag that permits sending outside the free-messaging window.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyTag {
    ConfirmedEventUpdate,
    PostPurchaseUpdate,
    AccountUpdate,
    HumanAgent,
}

/// A unit of outbound work as stored in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTask {
    pub id: TaskId,
    pub tenant_id: TenantId,
    pub recipient_id: RecipientId,
    pub body: String,
    pub policy_tag: Option<PolicyTag>,
    pub priority: i32,
    pub idempotency_key: String,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub not_before: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub provider_message_id: Option<String>,
}

/// A validated task ready to be inserted into the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub tenant_id: TenantId,
    pub recipient_id: RecipientId,
    pub body: String,
    pub policy_tag: Option<PolicyTag>,
    pub priority: i32,
    pub idempotency_key: String,
    /// Earliest pickup time; `None` means immediately.
    pub not_before: Option<DateTime<Utc>>,
}

/// Result of an enqueue call as seen by producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "task_id", rename_all = "snake_case")]
pub enum EnqueueOutcome {
    /// A new row was created.
    Enqueued(TaskId),
    /// The idempotency key was already known; no row was created.
    Duplicate(TaskId),
}

impl EnqueueOutcome {
    pub fn task_id(&self) -> TaskId {
        match self {
            EnqueueOutcome::Enqueued(id) | EnqueueOutcome::Duplicate(id) => *id,
        }
    }
}

/// Per-status task counts for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub sending: u64,
    pub sent: u64,
    pub failed: u64,
    pub blocked_policy: u64,
}

/// Effective rate parameters for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantRateConfig {
    /// Sustained sends per second; also the token refill rate.
    #[serde(default = "default_baseline_rate")]
    pub baseline_rate: f64,

    /// Maximum token bucket capacity.
    #[serde(default = "default_burst_ceiling")]
    pub burst_ceiling: u32,

    /// Absolute sends-per-second cap, never exceeded.
    #[serde(default = "default_hard_guardrail")]
    pub hard_guardrail: f64,

    /// Minimum seconds between two sends to the same recipient.
    #[serde(default = "default_recipient_min_gap_secs")]
    pub recipient_min_gap_secs: f64,

    /// Upper bound for a single backoff period, in seconds.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: f64,

    /// Whether dispatch is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for TenantRateConfig {
    fn default() -> Self {
        Self {
            baseline_rate: default_baseline_rate(),
            burst_ceiling: default_burst_ceiling(),
            hard_guardrail: default_hard_guardrail(),
            recipient_min_gap_secs: default_recipient_min_gap_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            enabled: default_enabled(),
        }
    }
}

fn default_baseline_rate() -> f64 {
    20.0
}

fn default_burst_ceiling() -> u32 {
    40
}

fn default_hard_guardrail() -> f64 {
    25.0
}

fn default_recipient_min_gap_secs() -> f64 {
    1.0
}

fn default_max_backoff_secs() -> f64 {
    300.0
}

fn default_enabled() -> bool {
    true
}

impl TenantRateConfig {
    /// Applies a tenant override on top of this config, field by field.
    pub fn merged_with(&self, o: &RateOverride) -> TenantRateConfig {
        TenantRateConfig {
            baseline_rate: o.baseline_rate.unwrap_or(self.baseline_rate),
            burst_ceiling: o.burst_ceiling.unwrap_or(self.burst_ceiling),
            hard_guardrail: o.hard_guardrail.unwrap_or(self.hard_guardrail),
            recipient_min_gap_secs: o
                .recipient_min_gap_secs
                .unwrap_or(self.recipient_min_gap_secs),
            max_backoff_secs: o.max_backoff_secs.unwrap_or(self.max_backoff_secs),
            enabled: self.enabled,
        }
    }

    pub fn recipient_min_gap(&self) -> Duration {
        bounded_secs(self.recipient_min_gap_secs, 0.0)
    }

    pub fn max_backoff(&self) -> Duration {
        bounded_secs(self.max_backoff_secs, 1.0)
    }
}

/// Largest duration a rate setting may express, in seconds.
pub const MAX_RATE_DURATION_SECS: f64 = 86_400.0;

/// Seconds to a [`Duration`] clamped to `min..=MAX_RATE_DURATION_SECS`; NaN maps to `min`.
fn bounded_secs(secs: f64, min: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(min, MAX_RATE_DURATION_SECS))
        .unwrap_or_else(|_| Duration::from_secs_f64(min))
}

/// Optional per-tenant overrides of [`TenantRateConfig`] fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateOverride {
    pub baseline_rate: Option<f64>,
    pub burst_ceiling: Option<u32>,
    pub hard_guardrail: Option<f64>,
    pub recipient_min_gap_secs: Option<f64>,
    pub max_backoff_secs: Option<f64>,
}

/// A tenant as described by a configuration source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_id: TenantId,
    pub enabled: bool,
    pub overrides: RateOverride,
}

/// A single send attempt handed to the provider client.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub tenant_id: TenantId,
    pub recipient_id: RecipientId,
    pub body: String,
    pub tag: Option<PolicyTag>,
    pub idempotency_key: String,
}

impl OutboundRequest {
    pub fn for_task(task: &MessageTask) -> Self {
        Self {
            tenant_id: task.tenant_id.clone(),
            recipient_id: task.recipient_id.clone(),
            body: task.body.clone(),
            tag: task.policy_tag,
            idempotency_key: task.idempotency_key.clone(),
        }
    }
}

/// What the provider answered to a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResponse {
    /// Accepted; the provider assigned a message id.
    Delivered { message_id: String },
    /// Rejected with a provider error code.
    Rejected {
        code: i64,
        subcode: Option<i64>,
        message: String,
    },
}
