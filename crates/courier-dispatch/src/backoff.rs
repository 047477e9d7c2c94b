// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adaptive backoff on provider rate-limit signals.
//!
//! Engaging doubles the un-jittered base (from 1s, capped at
//! `max_backoff`), applies jitter in `[0.75, 1.25]` and halves the send
//! rate (floor 1/s). Each quiet minute after the last signal multiplies the
//! rate by 1.1; reaching the baseline clears all state.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use courier_core::TenantRateConfig;

pub const JITTER_MIN: f64 = 0.75;
pub const JITTER_MAX: f64 = 1.25;
const MIN_BASE: Duration = Duration::from_secs(1);
const RELAX_INTERVAL: Duration = Duration::from_secs(60);
const RELAX_FACTOR: f64 = 1.1;

/// Backoff state for one tenant. Pure: every method takes the current instant.
#[derive(Debug, Clone, Default)]
pub struct BackoffController {
    /// Reduced send rate; `None` means the tenant's baseline.
    reduced_rate: Option<f64>,
    backoff_until: Option<Instant>,
    last_rate_limit: Option<Instant>,
    last_relax: Option<Instant>,
    previous_base: Option<Duration>,
}

impl BackoffController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engages backoff with a random jitter and returns the jittered delay.
    pub fn engage(&mut self, now: Instant, config: &TenantRateConfig) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        self.engage_with_jitter(now, config, jitter)
    }

    /// Engages backoff with an explicit jitter factor.
    pub fn engage_with_jitter(
        &mut self,
        now: Instant,
        config: &TenantRateConfig,
        jitter: f64,
    ) -> Duration {
        let base = self.next_base(config);
        let delay = base.mul_f64(jitter.clamp(JITTER_MIN, JITTER_MAX));

        self.previous_base = Some(base);
        self.backoff_until = Some(now + delay);
        self.last_rate_limit = Some(now);
        self.last_relax = None;
        self.reduced_rate = Some((self.current_rate(config) / 2.0).max(1.0));
        delay
    }

    /// The un-jittered base the next engagement would use.
    pub fn next_base(&self, config: &TenantRateConfig) -> Duration {
        let doubled = self
            .previous_base
            .map(|b| b.saturating_mul(2))
            .unwrap_or(Duration::ZERO);
        doubled.max(MIN_BASE).min(config.max_backoff())
    }

    pub fn is_engaged(&self, now: Instant) -> bool {
        self.backoff_until.is_some_and(|until| now < until)
    }

    /// Time left until sends may resume.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.backoff_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Current target rate, never above the tenant's baseline.
    pub fn current_rate(&self, config: &TenantRateConfig) -> f64 {
        match self.reduced_rate {
            Some(rate) => rate.min(config.baseline_rate),
            None => config.baseline_rate,
        }
    }

    /// Rate the loop paces at: current rate capped by the hard guardrail.
    pub fn effective_rate(&self, config: &TenantRateConfig) -> f64 {
        self.current_rate(config).min(config.hard_guardrail)
    }

    /// Steps the rate back up after a quiet minute. Called after each success.
    pub fn relax_if_idle(&mut self, now: Instant, config: &TenantRateConfig) {
        let Some(last_signal) = self.last_rate_limit else {
            return;
        };
        let reference = self.last_relax.map_or(last_signal, |r| r.max(last_signal));
        if now.saturating_duration_since(reference) < RELAX_INTERVAL {
            return;
        }

        let next = self.current_rate(config) * RELAX_FACTOR;
        if next >= config.baseline_rate {
            *self = Self::default();
        } else {
            self.reduced_rate = Some(next);
            self.last_relax = Some(now);
        }
    }

    /// The un-jittered base of the last engagement.
    pub fn previous_base(&self) -> Option<Duration> {
        self.previous_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> TenantRateConfig {
        TenantRateConfig {
            baseline_rate: 20.0,
            max_backoff_secs: 30.0,
            ..TenantRateConfig::default()
        }
    }

    #[test]
    fn first_engage_is_one_second_times_jitter() {
        let cfg = config();
        let now = Instant::now();
        let mut b = BackoffController::new();
        let d = b.engage_with_jitter(now, &cfg, 1.2);
        assert_eq!(d, Duration::from_millis(1200));
        assert!(b.is_engaged(now + Duration::from_millis(1199)));
        assert!(!b.is_engaged(now + Duration::from_millis(1200)));
        assert_eq!(b.current_rate(&cfg), 10.0);
    }

    #[test]
    fn base_doubles_up_to_max() {
        let cfg = config();
        let now = Instant::now();
        let mut b = BackoffController::new();
        let bases: Vec<u64> = (0..7)
            .map(|_| {
                b.engage_with_jitter(now, &cfg, 1.0);
                b.previous_base().unwrap().as_secs()
            })
            .collect();
        assert_eq!(bases, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn rate_halves_with_floor_of_one() {
        let cfg = config();
        let now = Instant::now();
        let mut b = BackoffController::new();
        for _ in 0..10 {
            b.engage_with_jitter(now, &cfg, 1.0);
        }
        assert_eq!(b.current_rate(&cfg), 1.0);
    }

    #[test]
    fn relaxes_once_per_quiet_minute_and_clears_at_baseline() {
        let cfg = config();
        let t0 = Instant::now();
        let mut b = BackoffController::new();
        b.engage_with_jitter(t0, &cfg, 1.0);
        assert_eq!(b.current_rate(&cfg), 10.0);

        b.relax_if_idle(t0 + Duration::from_secs(30), &cfg);
        assert_eq!(b.current_rate(&cfg), 10.0);

        b.relax_if_idle(t0 + Duration::from_secs(60), &cfg);
        assert!((b.current_rate(&cfg) - 11.0).abs() < 1e-9);

        // A second call within the same minute does nothing.
        b.relax_if_idle(t0 + Duration::from_secs(61), &cfg);
        assert!((b.current_rate(&cfg) - 11.0).abs() < 1e-9);

        let mut t = t0 + Duration::from_secs(60);
        for _ in 0..10 {
            t += RELAX_INTERVAL;
            b.relax_if_idle(t, &cfg);
        }
        assert_eq!(b.current_rate(&cfg), 20.0);
        assert!(b.previous_base().is_none());
        assert_eq!(b.next_base(&cfg), Duration::from_secs(1));
    }

    #[test]
    fn effective_rate_respects_guardrail() {
        let cfg = TenantRateConfig {
            baseline_rate: 50.0,
            hard_guardrail: 25.0,
            ..TenantRateConfig::default()
        };
        let b = BackoffController::new();
        assert_eq!(b.effective_rate(&cfg), 25.0);
    }

    #[test]
    fn lowered_baseline_caps_reduced_rate() {
        let now = Instant::now();
        let mut b = BackoffController::new();
        b.engage_with_jitter(now, &config(), 1.0);
        let lowered = TenantRateConfig {
            baseline_rate: 4.0,
            ..config()
        };
        assert_eq!(b.current_rate(&lowered), 4.0);
    }

    proptest! {
        #[test]
        fn bases_are_monotonic_and_jitter_bounded(
            max_backoff in 1.0f64..600.0,
            jitters in prop::collection::vec(JITTER_MIN..=JITTER_MAX, 1..30),
        ) {
            let cfg = TenantRateConfig { max_backoff_secs: max_backoff, ..config() };
            let now = Instant::now();
            let mut b = BackoffController::new();
            let mut prev = Duration::ZERO;
            for jitter in jitters {
                let delay = b.engage_with_jitter(now, &cfg, jitter);
                let base = b.previous_base().unwrap();
                prop_assert!(base >= prev);
                prop_assert!(base <= cfg.max_backoff());
                let lo = base.as_secs_f64() * JITTER_MIN - 1e-6;
                let hi = base.as_secs_f64() * JITTER_MAX + 1e-6;
                prop_assert!(delay.as_secs_f64() >= lo && delay.as_secs_f64() <= hi);
                prev = base;
            }
        }

        #[test]
        fn random_jitter_stays_in_range(n in 1usize..20) {
            let cfg = config();
            let now = Instant::now();
            let mut b = BackoffController::new();
            for _ in 0..n {
                let delay = b.engage(now, &cfg).as_secs_f64();
                let base = b.previous_base().unwrap().as_secs_f64();
                prop_assert!(delay >= base * JITTER_MIN - 1e-6);
                prop_assert!(delay <= base * JITTER_MAX + 1e-6);
            }
        }
    }
}
