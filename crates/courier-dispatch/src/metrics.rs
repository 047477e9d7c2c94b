// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker counters and status snapshots.
//!
//! Counters are atomics written by the tenant's dispatch loop and read by
//! the supervisor. With the `prometheus` feature every recorded outcome is
//! also emitted through the metrics facade.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Final disposition of one claimed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Sent,
    Failed,
    Blocked,
    Requeued,
    RateLimited,
}

impl TaskOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskOutcome::Sent => "sent",
            TaskOutcome::Failed => "failed",
            TaskOutcome::Blocked => "blocked",
            TaskOutcome::Requeued => "requeued",
            TaskOutcome::RateLimited => "rate_limited",
        }
    }
}

/// Live counters for one tenant's loop.
#[derive(Debug)]
pub struct WorkerMetrics {
    tenant: String,
    started: Instant,
    processed: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    blocked: AtomicU64,
    requeued: AtomicU64,
    rate_limited: AtomicU64,
    released: AtomicU64,
    processing_micros: AtomicU64,
    /// Epoch millis of the last processed task; 0 when none.
    last_activity_ms: AtomicI64,
}

impl WorkerMetrics {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            started: Instant::now(),
            processed: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            released: AtomicU64::new(0),
            processing_micros: AtomicU64::new(0),
            last_activity_ms: AtomicI64::new(0),
        }
    }

    /// Counts one processed task and how long it took from claim to persist.
    pub fn record(&self, outcome: TaskOutcome, elapsed: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            TaskOutcome::Sent => &self.sent,
            TaskOutcome::Failed => &self.failed,
            TaskOutcome::Blocked => &self.blocked,
            TaskOutcome::Requeued => &self.requeued,
            TaskOutcome::RateLimited => &self.rate_limited,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.processing_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);

        #[cfg(feature = "prometheus")]
        courier_prometheus::record_outcome(&self.tenant, outcome.as_str());
    }

    /// Counts a claimed task handed back without a send attempt.
    pub fn record_release(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "prometheus")]
        courier_prometheus::record_outcome(&self.tenant, "released");
    }

    pub fn record_send_latency(&self, elapsed: Duration) {
        #[cfg(feature = "prometheus")]
        courier_prometheus::record_send_latency(&self.tenant, elapsed.as_secs_f64());
        #[cfg(not(feature = "prometheus"))]
        let _ = elapsed;
    }

    pub fn record_backoff(&self) {
        #[cfg(feature = "prometheus")]
        courier_prometheus::record_backoff(&self.tenant);
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let sent = self.sent.load(Ordering::Relaxed);
        let micros = self.processing_micros.load(Ordering::Relaxed);
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            processed,
            sent,
            failed: self.failed.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            error_rate: error_rate(processed, sent),
            avg_processing_ms: if processed == 0 {
                0.0
            } else {
                micros as f64 / processed as f64 / 1000.0
            },
            last_activity: (last > 0)
                .then(|| DateTime::<Utc>::from_timestamp_millis(last))
                .flatten(),
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}

fn error_rate(processed: u64, sent: u64) -> f64 {
    if processed == 0 {
        0.0
    } else {
        processed.saturating_sub(sent) as f64 / processed as f64
    }
}

/// Point-in-time copy of [`WorkerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub sent: u64,
    pub failed: u64,
    pub blocked: u64,
    pub requeued: u64,
    pub rate_limited: u64,
    pub released: u64,
    /// Share of processed tasks that did not end in `sent`.
    pub error_rate: f64,
    pub avg_processing_ms: f64,
    pub last_activity: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Adds another tenant's counters into this total.
    pub fn accumulate(&mut self, other: &MetricsSnapshot) {
        let weighted = self.avg_processing_ms * self.processed as f64
            + other.avg_processing_ms * other.processed as f64;
        self.processed += other.processed;
        self.sent += other.sent;
        self.failed += other.failed;
        self.blocked += other.blocked;
        self.requeued += other.requeued;
        self.rate_limited += other.rate_limited;
        self.released += other.released;
        self.error_rate = error_rate(self.processed, self.sent);
        self.avg_processing_ms = if self.processed == 0 {
            0.0
        } else {
            weighted / self.processed as f64
        };
        self.last_activity = self.last_activity.max(other.last_activity);
        self.uptime_secs = self.uptime_secs.max(other.uptime_secs);
    }
}

/// One tenant's entry in [`WorkerStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct TenantStatus {
    pub running: bool,
    pub tokens_remaining: u32,
    pub current_rate: f64,
    pub backoff_remaining_secs: f64,
    pub metrics: MetricsSnapshot,
}

/// Supervisor status as reported to the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub active_tenants: Vec<String>,
    pub tenants: BTreeMap<String, TenantStatus>,
    pub totals: MetricsSnapshot,
}

impl WorkerStatus {
    pub fn stopped() -> Self {
        Self {
            running: false,
            started_at: None,
            uptime_secs: 0,
            active_tenants: Vec::new(),
            tenants: BTreeMap::new(),
            totals: MetricsSnapshot::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_recorded_outcomes() {
        let m = WorkerMetrics::new("acme");
        m.record(TaskOutcome::Sent, Duration::from_millis(10));
        m.record(TaskOutcome::Sent, Duration::from_millis(30));
        m.record(TaskOutcome::RateLimited, Duration::from_millis(20));
        m.record(TaskOutcome::Blocked, Duration::from_millis(0));
        m.record_release();

        let s = m.snapshot();
        assert_eq!(s.processed, 4);
        assert_eq!(s.sent, 2);
        assert_eq!(s.rate_limited, 1);
        assert_eq!(s.blocked, 1);
        assert_eq!(s.released, 1);
        assert!((s.error_rate - 0.5).abs() < 1e-9);
        assert!((s.avg_processing_ms - 15.0).abs() < 1e-9);
        assert!(s.last_activity.is_some());
    }

    #[test]
    fn empty_snapshot_has_no_activity() {
        let s = WorkerMetrics::new("acme").snapshot();
        assert_eq!(s.processed, 0);
        assert_eq!(s.error_rate, 0.0);
        assert!(s.last_activity.is_none());
    }

    #[test]
    fn totals_accumulate_across_tenants() {
        let a = WorkerMetrics::new("a");
        a.record(TaskOutcome::Sent, Duration::from_millis(10));
        let b = WorkerMetrics::new("b");
        b.record(TaskOutcome::Failed, Duration::from_millis(30));

        let mut total = MetricsSnapshot::default();
        total.accumulate(&a.snapshot());
        total.accumulate(&b.snapshot());
        assert_eq!(total.processed, 2);
        assert_eq!(total.sent, 1);
        assert_eq!(total.failed, 1);
        assert!((total.error_rate - 0.5).abs() < 1e-9);
        assert!((total.avg_processing_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn status_serializes_for_the_control_surface() {
        let json = serde_json::to_value(WorkerStatus::stopped()).unwrap();
        assert_eq!(json["running"], false);
        assert!(json["tenants"].as_object().unwrap().is_empty());
    }
}
