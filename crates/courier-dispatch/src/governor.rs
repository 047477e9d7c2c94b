// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token bucket throughput governor.
//!
//! Each tenant owns one bucket. Tokens refill lazily on every call by
//! `floor(elapsed * baseline_rate)`, never beyond `burst_ceiling`. The
//! fractional remainder of a refill is kept by advancing `last_refill` only
//! by the time the granted tokens account for.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use courier_core::TenantRateConfig;

/// Bucket state. Pure: every method takes the current instant.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(burst_ceiling: u32, now: Instant) -> Self {
        Self {
            tokens: burst_ceiling,
            last_refill: now,
        }
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    /// Applies lazy refill and clamps to the current ceiling.
    pub fn refill(&mut self, now: Instant, config: &TenantRateConfig) {
        let ceiling = config.burst_ceiling;
        if self.tokens >= ceiling {
            self.tokens = ceiling;
            self.last_refill = now;
            return;
        }

        let rate = config.baseline_rate;
        if rate <= 0.0 {
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let granted = (elapsed * rate).floor();
        if granted < 1.0 {
            return;
        }

        let total = u64::from(self.tokens).saturating_add(granted as u64);
        if total >= u64::from(ceiling) {
            self.tokens = ceiling;
            self.last_refill = now;
        } else {
            self.tokens = total as u32;
            self.last_refill += Duration::from_secs_f64(granted / rate);
        }
    }

    /// Refills, then takes one token if any is available.
    ///
    /// Returns `false` without changing the token count when empty.
    pub fn try_consume(&mut self, now: Instant, config: &TenantRateConfig) -> bool {
        self.refill(now, config);
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }
}

/// Per-tenant governor guarding a [`TokenBucket`] with a mutex.
#[derive(Debug)]
pub struct Governor {
    bucket: Mutex<TokenBucket>,
}

impl Governor {
    pub fn new(config: &TenantRateConfig) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(config.burst_ceiling, Instant::now())),
        }
    }

    /// Admission check for one send.
    pub async fn try_consume(&self, config: &TenantRateConfig) -> bool {
        self.bucket.lock().await.try_consume(Instant::now(), config)
    }

    /// Current credits after refill.
    pub async fn tokens_remaining(&self, config: &TenantRateConfig) -> u32 {
        let mut bucket = self.bucket.lock().await;
        bucket.refill(Instant::now(), config);
        bucket.tokens()
    }
}
