// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate-limited message dispatch for the Courier dispatcher.
//!
//! The [`WorkerSupervisor`] runs one [`DispatchLoop`] per enabled tenant.
//! Each loop drains its tenant's queue under three throttles:
//! - a token bucket [`Governor`] bounding throughput and burst
//! - a [`RecipientPacer`] enforcing the minimum gap per recipient
//! - a [`BackoffController`] reacting to provider rate-limit errors

pub mod backoff;
pub mod classify;
pub mod dispatch_loop;
pub mod enqueue;
pub mod governor;
pub mod metrics;
pub mod pacer;
pub mod shutdown;
pub mod supervisor;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use backoff::BackoffController;
pub use classify::{ErrorClassifier, SendClass};
pub use dispatch_loop::{DispatchDeps, DispatchLoop, Iteration, LoopExit, TenantState};
pub use enqueue::{EnqueueRequest, enqueue};
pub use governor::{Governor, TokenBucket};
pub use metrics::{MetricsSnapshot, TaskOutcome, TenantStatus, WorkerMetrics, WorkerStatus};
pub use pacer::RecipientPacer;
pub use supervisor::{ReconcileReport, WorkerSupervisor};

/// Sleeps for `duration` unless `cancel` fires first.
///
/// Returns `true` when the full duration elapsed.
pub(crate) async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
