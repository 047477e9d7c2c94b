// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every call is a
//! no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Courier metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "courier_tasks_total",
        "Tasks processed by outcome (sent, failed, blocked, requeued, rate_limited, released)"
    );
    describe_counter!(
        "courier_backoff_engaged_total",
        "Times a tenant entered backoff after a provider rate limit"
    );
    describe_histogram!(
        "courier_send_latency_seconds",
        "Provider send latency in seconds"
    );
    describe_gauge!("courier_sends_per_second", "Recent send rate per tenant");
    describe_gauge!("courier_tokens_remaining", "Token bucket credits per tenant");
    describe_gauge!("courier_queue_length", "Queued tasks per tenant");
    describe_gauge!(
        "courier_error_rate",
        "Share of processed tasks that did not end in sent, per tenant"
    );
    describe_gauge!(
        "courier_current_backoff_seconds",
        "Remaining backoff per tenant in seconds"
    );
    describe_gauge!("courier_active_tenants", "Tenants with a running dispatch loop");
}

/// Record the outcome of one processed task.
pub fn record_outcome(tenant: &str, outcome: &'static str) {
    metrics::counter!("courier_tasks_total", "tenant" => tenant.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record that a tenant engaged backoff.
pub fn record_backoff(tenant: &str) {
    metrics::counter!("courier_backoff_engaged_total", "tenant" => tenant.to_string())
        .increment(1);
}

/// Record provider send latency.
pub fn record_send_latency(tenant: &str, seconds: f64) {
    metrics::histogram!("courier_send_latency_seconds", "tenant" => tenant.to_string())
        .record(seconds);
}

/// Publish the periodic per-tenant gauges.
pub fn set_tenant_gauges(
    tenant: &str,
    sends_per_sec: f64,
    tokens_remaining: f64,
    queue_length: f64,
    error_rate: f64,
    current_backoff_secs: f64,
) {
    let t = tenant.to_string();
    metrics::gauge!("courier_sends_per_second", "tenant" => t.clone()).set(sends_per_sec);
    metrics::gauge!("courier_tokens_remaining", "tenant" => t.clone()).set(tokens_remaining);
    metrics::gauge!("courier_queue_length", "tenant" => t.clone()).set(queue_length);
    metrics::gauge!("courier_error_rate", "tenant" => t.clone()).set(error_rate);
    metrics::gauge!("courier_current_backoff_seconds", "tenant" => t).set(current_backoff_secs);
}

/// Set the number of tenants with a running loop.
pub fn set_active_tenants(count: f64) {
    metrics::gauge!("courier_active_tenants").set(count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn helpers_render_through_a_local_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            record_outcome("acme", "sent");
            record_outcome("acme", "sent");
            record_backoff("acme");
            set_tenant_gauges("acme", 4.0, 12.0, 30.0, 0.25, 1.5);
            set_active_tenants(1.0);
        });

        let text = handle.render();
        let line = |name: &str| {
            text.lines()
                .find(|l| l.starts_with(name) && !l.starts_with('#'))
                .map(str::to_string)
                .unwrap_or_default()
        };
        let sent = line("courier_tasks_total{");
        assert!(sent.contains(r#"outcome="sent""#), "{text}");
        assert!(sent.ends_with(" 2"), "{text}");
        assert!(line("courier_queue_length{").contains(r#"tenant="acme""#), "{text}");
        assert!(line("courier_active_tenants").starts_with("courier_active_tenants 1"), "{text}");
    }
}
