// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant worker supervisor.
//!
//! Owns the registry of running dispatch loops, one per enabled tenant,
//! and the timers that keep it in shape: health (reconcile loops with the
//! enabled tenant set, ping adapters), metrics, stale-claim reclaim and
//! config refresh. All registry changes go through one mutex. `start` and
//! `stop` are further serialized by a lifecycle mutex, so the registry
//! lock is free for `status` while `stop` waits on draining loops.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_core::{CourierError, HealthStatus, PluginAdapter, TenantId};

use crate::dispatch_loop::{DispatchDeps, DispatchLoop, LoopExit, TenantState};
use crate::metrics::{MetricsSnapshot, TenantStatus, WorkerStatus};

/// Handle to the supervisor. Cheap to clone.
#[derive(Clone)]
pub struct WorkerSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    deps: DispatchDeps,
    shutdown_grace: Duration,
    lifecycle: Mutex<()>,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    run: Option<RunState>,
    tenants: HashMap<TenantId, TenantWorker>,
}

struct RunState {
    cancel: CancellationToken,
    started: Instant,
    started_at: DateTime<Utc>,
    timers: Vec<JoinHandle<()>>,
}

struct TenantWorker {
    handle: JoinHandle<LoopExit>,
    state: Arc<TenantState>,
}

/// What one reconcile pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Loops spawned for enabled tenants that had none.
    pub started: Vec<TenantId>,
    /// Entries removed because their loop exited normally.
    pub removed: Vec<TenantId>,
    /// Entries removed because their loop panicked or was aborted.
    pub died: Vec<TenantId>,
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    Health,
    Metrics,
    Reclaim,
}

impl WorkerSupervisor {
    pub fn new(deps: DispatchDeps, shutdown_grace: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                shutdown_grace,
                lifecycle: Mutex::new(()),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Refreshes configuration, reclaims stale claims, spawns a loop per
    /// enabled tenant and starts the timers.
    ///
    /// Idempotent: when already running only the status is returned.
    pub async fn start(&self) -> WorkerStatus {
        {
            let _lifecycle = self.inner.lifecycle.lock().await;
            let mut registry = self.inner.registry.lock().await;
            if registry.run.is_none() {
                self.inner.start_locked(&mut registry).await;
            } else {
                debug!("worker supervisor already running");
            }
        }
        self.status().await
    }

    /// Cancels every loop, waits up to the grace period, aborts the rest
    /// and clears the registry. Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let (run, mut workers) = {
            let mut registry = self.inner.registry.lock().await;
            let Some(run) = registry.run.take() else {
                return false;
            };
            let workers: Vec<(TenantId, TenantWorker)> = registry.tenants.drain().collect();
            (run, workers)
        };
        info!(tenants = workers.len(), "stopping worker supervisor");

        run.cancel.cancel();
        for timer in &run.timers {
            timer.abort();
        }

        let drained = tokio::time::timeout(
            self.inner.shutdown_grace,
            join_all(workers.iter_mut().map(|(_, w)| &mut w.handle)),
        )
        .await;
        if drained.is_err() {
            for (tenant, worker) in &workers {
                if !worker.handle.is_finished() {
                    warn!(
                        tenant_id = %tenant,
                        "dispatch loop did not stop within grace period, aborting"
                    );
                    worker.handle.abort();
                }
            }
        }
        for timer in run.timers {
            let _ = timer.await;
        }

        #[cfg(feature = "prometheus")]
        courier_prometheus::set_active_tenants(0.0);

        info!(
            uptime_secs = run.started.elapsed().as_secs(),
            "worker supervisor stopped"
        );
        true
    }

    pub async fn is_running(&self) -> bool {
        self.inner.registry.lock().await.run.is_some()
    }

    /// Ensures a loop runs for `tenant`.
    ///
    /// Returns `true` if a loop was spawned, `false` if one was already
    /// running. Fails with [`CourierError::NotRunning`] while stopped and
    /// with a validation error when the tenant is not enabled.
    pub async fn start_for_tenant(&self, tenant: &TenantId) -> Result<bool, CourierError> {
        let mut registry = self.inner.registry.lock().await;
        let Some(root) = registry.run.as_ref().map(|r| r.cancel.clone()) else {
            return Err(CourierError::NotRunning);
        };

        let config = &self.inner.deps.config;
        if !config.is_enabled(tenant) {
            // It may have been enabled since the last refresh.
            if let Err(e) = config.refresh().await {
                warn!(error = %e, "tenant config refresh failed, using last known settings");
            }
            if !config.is_enabled(tenant) {
                return Err(CourierError::Validation(format!(
                    "tenant `{tenant}` is not enabled"
                )));
            }
        }

        if let Some(worker) = registry.tenants.get(tenant)
            && !worker.handle.is_finished()
        {
            return Ok(false);
        }

        let worker = self.inner.spawn_loop(&root, tenant);
        registry.tenants.insert(tenant.clone(), worker);
        info!(tenant_id = %tenant, "dispatch loop started on demand");
        Ok(true)
    }

    /// Running flag, uptime, per-tenant metrics and totals.
    pub async fn status(&self) -> WorkerStatus {
        let registry = self.inner.registry.lock().await;
        let Some(run) = registry.run.as_ref() else {
            return WorkerStatus::stopped();
        };

        let now = Instant::now();
        let mut tenants = BTreeMap::new();
        let mut totals = MetricsSnapshot::default();
        for (tenant, worker) in &registry.tenants {
            let config = self.inner.deps.config.effective_config(tenant);
            let metrics = worker.state.metrics.snapshot();
            totals.accumulate(&metrics);
            let (current_rate, backoff_remaining) = {
                let backoff = worker.state.backoff.lock().await;
                (backoff.current_rate(&config), backoff.remaining(now))
            };
            let tokens_remaining = worker.state.governor.tokens_remaining(&config).await;
            tenants.insert(
                tenant.to_string(),
                TenantStatus {
                    running: !worker.handle.is_finished(),
                    tokens_remaining,
                    current_rate,
                    backoff_remaining_secs: backoff_remaining.as_secs_f64(),
                    metrics,
                },
            );
        }
        let active_tenants = tenants
            .iter()
            .filter(|(_, t)| t.running)
            .map(|(id, _)| id.clone())
            .collect();

        WorkerStatus {
            running: true,
            started_at: Some(run.started_at),
            uptime_secs: run.started.elapsed().as_secs(),
            active_tenants,
            tenants,
            totals,
        }
    }

    /// One health-timer pass: reap exited loops, spawn missing ones.
    pub async fn reconcile(&self) -> ReconcileReport {
        self.inner.reconcile().await
    }

    /// Returns stranded `sending` tasks to the queue.
    pub async fn reclaim(&self) -> Result<u64, CourierError> {
        self.inner.reclaim().await
    }

    /// Publishes per-tenant gauges once.
    pub async fn publish_metrics(&self) {
        self.inner.publish_metrics().await
    }
}

impl Inner {
    async fn start_locked(self: &Arc<Self>, registry: &mut Registry) {
        let config = &self.deps.config;
        if let Err(e) = config.refresh().await {
            warn!(error = %e, "tenant config refresh failed, using last known settings");
        }
        let _ = self.reclaim().await;

        let root = CancellationToken::new();
        for tenant in config.enabled_tenants() {
            let worker = self.spawn_loop(&root, &tenant);
            registry.tenants.insert(tenant, worker);
        }

        let worker = &self.deps.worker;
        let timers = vec![
            spawn_timer(
                Arc::clone(self),
                Timer::Health,
                worker.health_check(),
                root.child_token(),
            ),
            spawn_timer(
                Arc::clone(self),
                Timer::Metrics,
                worker.metrics_interval(),
                root.child_token(),
            ),
            spawn_timer(
                Arc::clone(self),
                Timer::Reclaim,
                worker.reclaim_interval(),
                root.child_token(),
            ),
            config.spawn_refresher(worker.config_refresh(), root.child_token()),
        ];

        registry.run = Some(RunState {
            cancel: root,
            started: Instant::now(),
            started_at: Utc::now(),
            timers,
        });
        info!(
            tenants = registry.tenants.len(),
            "worker supervisor started"
        );
    }

    fn spawn_loop(&self, root: &CancellationToken, tenant: &TenantId) -> TenantWorker {
        let config = self.deps.config.effective_config(tenant);
        let state = Arc::new(TenantState::new(tenant, &config));
        let dispatch = DispatchLoop::new(tenant.clone(), self.deps.clone(), Arc::clone(&state));
        let handle = tokio::spawn(dispatch.run(root.child_token()));
        TenantWorker { handle, state }
    }

    async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut registry = self.registry.lock().await;
        let Some(root) = registry.run.as_ref().map(|r| r.cancel.clone()) else {
            return report;
        };

        let finished: Vec<TenantId> = registry
            .tenants
            .iter()
            .filter(|(_, w)| w.handle.is_finished())
            .map(|(t, _)| t.clone())
            .collect();
        for tenant in finished {
            let Some(worker) = registry.tenants.remove(&tenant) else {
                continue;
            };
            match worker.handle.await {
                Ok(exit) => {
                    info!(tenant_id = %tenant, exit = ?exit, "dispatch loop removed");
                    report.removed.push(tenant);
                }
                Err(e) => {
                    error!(tenant_id = %tenant, error = %e, "dispatch loop died");
                    report.died.push(tenant);
                }
            }
        }

        for tenant in self.deps.config.enabled_tenants() {
            if !registry.tenants.contains_key(&tenant) {
                let worker = self.spawn_loop(&root, &tenant);
                registry.tenants.insert(tenant.clone(), worker);
                info!(tenant_id = %tenant, "dispatch loop started for enabled tenant");
                report.started.push(tenant);
            }
        }
        report
    }

    async fn check_adapters(&self) {
        let store = &self.deps.store;
        let provider = &self.deps.provider;
        for (name, health) in [
            (store.name().to_string(), store.health_check().await),
            (provider.name().to_string(), provider.health_check().await),
        ] {
            match health {
                Ok(HealthStatus::Healthy) => {}
                Ok(HealthStatus::Degraded(reason)) => {
                    warn!(adapter = %name, reason = %reason, "adapter degraded");
                }
                Ok(HealthStatus::Unhealthy(reason)) => {
                    error!(adapter = %name, reason = %reason, "adapter unhealthy");
                }
                Err(e) => error!(adapter = %name, error = %e, "adapter health check failed"),
            }
        }
    }

    async fn reclaim(&self) -> Result<u64, CourierError> {
        match self
            .deps
            .store
            .reclaim_stale(self.deps.worker.stale_claim())
            .await
        {
            Ok(0) => Ok(0),
            Ok(n) => {
                info!(count = n, "reclaimed stale claimed tasks");
                Ok(n)
            }
            Err(e) => {
                warn!(error = %e, "stale claim sweep failed");
                Err(e)
            }
        }
    }

    async fn publish_metrics(&self) {
        let entries: Vec<(TenantId, Arc<TenantState>)> = {
            let registry = self.registry.lock().await;
            registry
                .tenants
                .iter()
                .map(|(t, w)| (t.clone(), Arc::clone(&w.state)))
                .collect()
        };
        let period = self.deps.worker.metrics_interval().as_secs_f64().max(1e-3);

        for (tenant, state) in &entries {
            let config = self.deps.config.effective_config(tenant);
            let tokens = state.governor.tokens_remaining(&config).await;
            let backoff = state.backoff.lock().await.remaining(Instant::now());
            let queue_length = match self.deps.store.queue_depth(tenant).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(tenant_id = %tenant, error = %e, "queue depth lookup failed");
                    0
                }
            };
            let snapshot = state.metrics.snapshot();
            let previous = state
                .sent_at_last_sample
                .swap(snapshot.sent, Ordering::Relaxed);
            let sends_per_sec = snapshot.sent.saturating_sub(previous) as f64 / period;

            debug!(
                tenant_id = %tenant,
                sends_per_sec,
                tokens_remaining = tokens,
                queue_length,
                error_rate = snapshot.error_rate,
                current_backoff_secs = backoff.as_secs_f64(),
                "tenant metrics"
            );

            #[cfg(feature = "prometheus")]
            courier_prometheus::set_tenant_gauges(
                &tenant.0,
                sends_per_sec,
                f64::from(tokens),
                queue_length as f64,
                snapshot.error_rate,
                backoff.as_secs_f64(),
            );
        }

        #[cfg(feature = "prometheus")]
        courier_prometheus::set_active_tenants(entries.len() as f64);
    }
}

fn spawn_timer(
    inner: Arc<Inner>,
    timer: Timer,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match timer {
                Timer::Health => {
                    inner.reconcile().await;
                    inner.check_adapters().await;
                }
                Timer::Metrics => inner.publish_metrics().await,
                Timer::Reclaim => {
                    let _ = inner.reclaim().await;
                }
            }
        }
        debug!(timer = ?timer, "supervisor timer stopped");
    })
}
