// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-recipient minimum gap enforcement.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use courier_core::RecipientId;

use crate::sleep_or_cancel;

/// Entries are pruned once the map grows past this many recipients.
const PRUNE_THRESHOLD: usize = 1024;

/// Last send instant per recipient for one tenant.
///
/// Owned by the tenant's dispatch loop and dropped with it.
#[derive(Debug, Default)]
pub struct RecipientPacer {
    last_send: HashMap<RecipientId, Instant>,
}

impl RecipientPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a send to `recipient` must still wait at `now`.
    pub fn delay_for(&self, recipient: &RecipientId, now: Instant, gap: Duration) -> Duration {
        match self.last_send.get(recipient) {
            Some(last) => (*last + gap).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Suspends until the gap since the last send to `recipient` has elapsed.
    ///
    /// Returns `false` if `cancel` fired first.
    pub async fn wait_for_recipient(
        &self,
        recipient: &RecipientId,
        gap: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let delay = self.delay_for(recipient, Instant::now(), gap);
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        sleep_or_cancel(delay, cancel).await
    }

    /// Notes a send attempt to `recipient` at `now`.
    pub fn record_send(&mut self, recipient: &RecipientId, now: Instant, gap: Duration) {
        self.last_send.insert(recipient.clone(), now);
        if self.last_send.len() > PRUNE_THRESHOLD {
            self.prune(now, gap);
        }
    }

    /// Drops entries whose gap has already elapsed.
    pub fn prune(&mut self, now: Instant, gap: Duration) {
        self.last_send
            .retain(|_, last| now.saturating_duration_since(*last) < gap);
    }

    pub fn len(&self) -> usize {
        self.last_send.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_send.is_empty()
    }
}
