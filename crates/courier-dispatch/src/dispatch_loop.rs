// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant dispatch loop.
//!
//! Each iteration: honour backoff, claim the next eligible task, take a
//! token, wait out the recipient gap, check the messaging window, send with
//! a timeout, classify the answer and persist the new status. Every
//! suspension point races the loop's [`CancellationToken`]; a task claimed
//! when cancellation arrives is released back to the queue.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_config::ConfigProvider;
use courier_config::model::WorkerConfig;
use courier_core::{
    CourierError, MessageTask, OutboundRequest, ProviderClient, QueueStore, TaskStatus, TenantId,
    TenantRateConfig,
};
use courier_core::types::MAX_RATE_DURATION_SECS;

use crate::backoff::BackoffController;
use crate::classify::{ErrorClassifier, SendClass};
use crate::governor::Governor;
use crate::metrics::{TaskOutcome, WorkerMetrics};
use crate::pacer::RecipientPacer;
use crate::sleep_or_cancel;

const BLOCKED_REASON: &str = "recipient outside the messaging window and no policy tag";

/// Collaborators shared by every tenant's loop.
#[derive(Clone)]
pub struct DispatchDeps {
    pub store: Arc<dyn QueueStore>,
    pub provider: Arc<dyn ProviderClient>,
    pub config: Arc<ConfigProvider>,
    pub classifier: Arc<ErrorClassifier>,
    pub worker: WorkerConfig,
}

/// Per-tenant state shared between the loop and the supervisor.
///
/// Lives in the supervisor's registry entry; dropping the entry drops the
/// tenant's governor and backoff state.
#[derive(Debug)]
pub struct TenantState {
    pub governor: Governor,
    pub backoff: Mutex<BackoffController>,
    pub metrics: WorkerMetrics,
    /// `sent` counter at the previous metrics tick.
    pub(crate) sent_at_last_sample: AtomicU64,
}

impl TenantState {
    pub fn new(tenant: &TenantId, config: &TenantRateConfig) -> Self {
        Self {
            governor: Governor::new(config),
            backoff: Mutex::new(BackoffController::new()),
            metrics: WorkerMetrics::new(tenant.to_string()),
            sent_at_last_sample: AtomicU64::new(0),
        }
    }
}

/// Result of one loop iteration, before the trailing sleep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Iteration {
    /// Backoff is engaged for the given remaining time.
    BackedOff(Duration),
    /// Nothing eligible to claim.
    Idle,
    /// No token available; the claimed task was released.
    Throttled,
    /// A task was processed to the given outcome.
    Processed(TaskOutcome),
    /// A store call failed; logged.
    StoreError,
    /// The claim was reclaimed while waiting; the task was not sent.
    ClaimLost,
    /// Cancellation fired; any claimed task was released.
    Cancelled,
}

/// Why a loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    Disabled,
}

pub struct DispatchLoop {
    tenant: TenantId,
    deps: DispatchDeps,
    state: Arc<TenantState>,
    pacer: RecipientPacer,
}

impl DispatchLoop {
    pub fn new(tenant: TenantId, deps: DispatchDeps, state: Arc<TenantState>) -> Self {
        Self {
            tenant,
            deps,
            state,
            pacer: RecipientPacer::new(),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Runs until cancelled or until the tenant is disabled.
    pub async fn run(mut self, cancel: CancellationToken) -> LoopExit {
        info!(tenant_id = %self.tenant, "dispatch loop started");

        let exit = loop {
            if cancel.is_cancelled() {
                break LoopExit::Cancelled;
            }
            let config = self.deps.config.effective_config(&self.tenant);
            if !config.enabled {
                break LoopExit::Disabled;
            }

            let pause = match self.tick(&config, &cancel).await {
                Iteration::Cancelled => break LoopExit::Cancelled,
                Iteration::BackedOff(remaining) => remaining,
                Iteration::Idle | Iteration::StoreError | Iteration::ClaimLost => {
                    self.deps.worker.idle_poll()
                }
                Iteration::Throttled => self.deps.worker.throttle_retry(),
                Iteration::Processed(_) => self.send_interval(&config).await,
            };

            if !sleep_or_cancel(pause, &cancel).await {
                break LoopExit::Cancelled;
            }
        };

        info!(tenant_id = %self.tenant, exit = ?exit, "dispatch loop stopped");
        exit
    }

    /// Runs a single iteration without the trailing sleep.
    pub async fn tick(
        &mut self,
        config: &TenantRateConfig,
        cancel: &CancellationToken,
    ) -> Iteration {
        {
            let backoff = self.state.backoff.lock().await;
            let now = Instant::now();
            if backoff.is_engaged(now) {
                return Iteration::BackedOff(backoff.remaining(now));
            }
        }

        let task = match self.deps.store.claim_next(&self.tenant).await {
            Ok(Some(task)) => task,
            Ok(None) => return Iteration::Idle,
            Err(e) => {
                error!(tenant_id = %self.tenant, error = %e, "failed to claim next task");
                return Iteration::StoreError;
            }
        };
        let claimed_at = Instant::now();

        if !self.state.governor.try_consume(config).await {
            debug!(tenant_id = %self.tenant, task_id = %task.id, "token bucket empty, releasing task");
            self.release(&task).await;
            return Iteration::Throttled;
        }

        let gap = config.recipient_min_gap();
        if !self
            .pacer
            .wait_for_recipient(&task.recipient_id, gap, cancel)
            .await
        {
            self.release(&task).await;
            return Iteration::Cancelled;
        }

        // The pacer wait may outlast the stale-claim threshold.
        match self.deps.store.touch_claim(task.id).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(
                    tenant_id = %self.tenant,
                    task_id = %task.id,
                    "claim reclaimed while pacing, skipping send"
                );
                return Iteration::ClaimLost;
            }
            Err(e) => {
                error!(
                    tenant_id = %self.tenant,
                    task_id = %task.id,
                    error = %e,
                    "failed to renew claim"
                );
                self.release(&task).await;
                return Iteration::StoreError;
            }
        }

        if task.policy_tag.is_none() {
            match self.within_messaging_window(&task).await {
                Ok(true) => {}
                Ok(false) => {
                    return self
                        .persist(&task, claimed_at, self.block(&task).await)
                        .await;
                }
                Err(e) => {
                    error!(
                        tenant_id = %self.tenant,
                        task_id = %task.id,
                        error = %e,
                        "failed to look up recipient activity"
                    );
                    self.release(&task).await;
                    return Iteration::StoreError;
                }
            }
        }

        let request = OutboundRequest::for_task(&task);
        let timeout = self.deps.worker.send_timeout();
        let send_started = Instant::now();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = tokio::time::timeout(timeout, self.deps.provider.send(&request)) => Some(r),
        };
        let Some(result) = sent else {
            warn!(
                tenant_id = %self.tenant,
                task_id = %task.id,
                "cancelled during send, releasing task"
            );
            self.release(&task).await;
            return Iteration::Cancelled;
        };
        self.state.metrics.record_send_latency(send_started.elapsed());
        self.pacer.record_send(&task.recipient_id, Instant::now(), gap);

        let result = result.unwrap_or(Err(CourierError::Timeout { duration: timeout }));
        let class = self.deps.classifier.classify(result);
        let settled = self.settle(&task, class, config).await;
        self.persist(&task, claimed_at, settled).await
    }

    async fn within_messaging_window(&self, task: &MessageTask) -> Result<bool, CourierError> {
        let last = self
            .deps
            .store
            .last_inbound(&task.tenant_id, &task.recipient_id)
            .await?;
        let window = self.deps.worker.policy_window();
        Ok(match last {
            Some(at) => match Utc::now().signed_duration_since(at).to_std() {
                Ok(age) => age < window,
                // Recorded in the future: treat as just seen.
                Err(_) => true,
            },
            None => false,
        })
    }

    async fn block(&self, task: &MessageTask) -> Result<TaskOutcome, CourierError> {
        self.deps
            .store
            .mark_terminal(task.id, TaskStatus::BlockedPolicy, Some(BLOCKED_REASON), None)
            .await?;
        info!(
            tenant_id = %self.tenant,
            task_id = %task.id,
            recipient_id = %task.recipient_id,
            "task blocked by messaging policy"
        );
        Ok(TaskOutcome::Blocked)
    }

    async fn settle(
        &self,
        task: &MessageTask,
        class: SendClass,
        config: &TenantRateConfig,
    ) -> Result<TaskOutcome, CourierError> {
        let store = &self.deps.store;
        match class {
            SendClass::Delivered { message_id } => {
                store
                    .mark_terminal(task.id, TaskStatus::Sent, None, Some(&message_id))
                    .await?;
                self.state
                    .backoff
                    .lock()
                    .await
                    .relax_if_idle(Instant::now(), config);
                debug!(
                    tenant_id = %self.tenant,
                    task_id = %task.id,
                    message_id = %message_id,
                    "message sent"
                );
                Ok(TaskOutcome::Sent)
            }
            SendClass::RateLimited { detail } => {
                let delay = self
                    .state
                    .backoff
                    .lock()
                    .await
                    .engage(Instant::now(), config);
                self.state.metrics.record_backoff();
                warn!(
                    tenant_id = %self.tenant,
                    task_id = %task.id,
                    backoff_ms = delay.as_millis() as u64,
                    detail = %detail,
                    "provider rate limit, backing off"
                );
                store
                    .requeue(task.id, self.deps.worker.rate_limit_requeue(), Some(&detail))
                    .await?;
                Ok(TaskOutcome::RateLimited)
            }
            SendClass::PolicyRejected { detail } => {
                store
                    .mark_terminal(task.id, TaskStatus::Failed, Some(&detail), None)
                    .await?;
                warn!(
                    tenant_id = %self.tenant,
                    task_id = %task.id,
                    detail = %detail,
                    "provider rejected message on policy grounds"
                );
                Ok(TaskOutcome::Failed)
            }
            SendClass::Transient { detail } => {
                if task.retry_count < self.deps.worker.max_retries {
                    let delay = retry_delay(task.retry_count);
                    store.requeue(task.id, delay, Some(&detail)).await?;
                    debug!(
                        tenant_id = %self.tenant,
                        task_id = %task.id,
                        retry_count = task.retry_count + 1,
                        delay_secs = delay.as_secs(),
                        detail = %detail,
                        "send failed, requeued"
                    );
                    Ok(TaskOutcome::Requeued)
                } else {
                    store
                        .mark_terminal(task.id, TaskStatus::Failed, Some(&detail), None)
                        .await?;
                    warn!(
                        tenant_id = %self.tenant,
                        task_id = %task.id,
                        retry_count = task.retry_count,
                        detail = %detail,
                        "send failed, retries exhausted"
                    );
                    Ok(TaskOutcome::Failed)
                }
            }
        }
    }

    async fn persist(
        &self,
        task: &MessageTask,
        claimed_at: Instant,
        settled: Result<TaskOutcome, CourierError>,
    ) -> Iteration {
        match settled {
            Ok(outcome) => {
                self.state.metrics.record(outcome, claimed_at.elapsed());
                Iteration::Processed(outcome)
            }
            Err(e) => {
                // Left in `sending`; the reclaim sweep returns it to the queue.
                error!(
                    tenant_id = %self.tenant,
                    task_id = %task.id,
                    error = %e,
                    "failed to persist task outcome"
                );
                Iteration::StoreError
            }
        }
    }

    async fn release(&self, task: &MessageTask) {
        match self.deps.store.release(task.id).await {
            Ok(()) => self.state.metrics.record_release(),
            Err(e) => error!(
                tenant_id = %self.tenant,
                task_id = %task.id,
                error = %e,
                "failed to release claimed task"
            ),
        }
    }

    /// Pause after a processed task: `1 / min(current_rate, hard_guardrail)`.
    async fn send_interval(&self, config: &TenantRateConfig) -> Duration {
        let rate = self.state.backoff.lock().await.effective_rate(config);
        if rate > 0.0 {
            Duration::from_secs_f64((1.0 / rate).min(MAX_RATE_DURATION_SECS))
        } else {
            self.deps.worker.idle_poll()
        }
    }
}

/// `2^retry_count` seconds.
pub fn retry_delay(retry_count: u32) -> Duration {
    Duration::from_secs(1u64 << retry_count.min(20))
}
