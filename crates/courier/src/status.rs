// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` command implementation.
//!
//! Queries a running daemon's control surface for supervisor state and
//! per-tenant throttle figures. Reports "not running" when nothing answers.

use std::collections::BTreeMap;
use std::time::Duration;

use courier_config::CourierConfig;
use courier_core::CourierError;
use serde::{Deserialize, Serialize};

/// The subset of `/v1/workers` this command prints.
#[derive(Debug, Deserialize)]
struct WorkersResponse {
    running: bool,
    uptime_secs: u64,
    #[serde(default)]
    tenants: BTreeMap<String, TenantLine>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenantLine {
    pub running: bool,
    pub tokens_remaining: u32,
    pub current_rate: f64,
    pub backoff_remaining_secs: f64,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub reachable: bool,
    pub dispatch_running: bool,
    pub uptime_secs: Option<u64>,
    pub uptime_human: Option<String>,
    pub endpoint: String,
    pub tenants: BTreeMap<String, TenantLine>,
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Runs the `courier status` command.
pub async fn run_status(config: &CourierConfig, json: bool) -> Result<(), CourierError> {
    let endpoint = format!("http://{}/v1/workers", config.daemon.control_bind);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| CourierError::Internal(format!("failed to create HTTP client: {e}")))?;

    let response = match client.get(&endpoint).send().await {
        Ok(resp) if resp.status().is_success() => Some(resp.json::<WorkersResponse>().await.map_err(
            |e| CourierError::Internal(format!("failed to parse status response: {e}")),
        )?),
        _ => None,
    };

    let status = match response {
        Some(workers) => StatusResponse {
            reachable: true,
            dispatch_running: workers.running,
            uptime_secs: Some(workers.uptime_secs),
            uptime_human: Some(format_uptime(workers.uptime_secs)),
            endpoint,
            tenants: workers.tenants,
        },
        None => StatusResponse {
            reachable: false,
            dispatch_running: false,
            uptime_secs: None,
            uptime_human: None,
            endpoint,
            tenants: BTreeMap::new(),
        },
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print!("{}", render_plain(&status));
    }
    Ok(())
}

fn render_plain(status: &StatusResponse) -> String {
    let mut out = String::new();
    out.push_str("\n  courier status\n");
    out.push_str(&format!("  {}\n", "-".repeat(35)));

    if !status.reachable {
        out.push_str("    State:    [FAIL] not running\n");
        out.push_str(&format!("    Endpoint: {}\n\n", status.endpoint));
        out.push_str("  Start with: courier serve\n\n");
        return out;
    }

    let state = if status.dispatch_running { "dispatching" } else { "stopped" };
    out.push_str(&format!(
        "    State:    [OK] {state} (uptime: {})\n",
        status.uptime_human.as_deref().unwrap_or("-")
    ));
    for (tenant, line) in &status.tenants {
        let backoff = if line.backoff_remaining_secs > 0.0 {
            format!(", backoff {:.1}s", line.backoff_remaining_secs)
        } else {
            String::new()
        };
        out.push_str(&format!(
            "    {tenant}: {:.1} msg/s, {} tokens{backoff}\n",
            line.current_rate, line.tokens_remaining
        ));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_uptime_minutes() {
        assert_eq!(format_uptime(120), "2m");
    }

    #[test]
    fn format_uptime_hours() {
        assert_eq!(format_uptime(3720), "1h 2m");
    }

    #[test]
    fn format_uptime_days() {
        assert_eq!(format_uptime(90060), "1d 1h 1m");
    }

    #[test]
    fn workers_response_ignores_extra_fields() {
        let body = r#"{
            "running": true,
            "started_at": "2026-01-01T00:00:00Z",
            "uptime_secs": 61,
            "active_tenants": ["acme"],
            "tenants": {
                "acme": {
                    "running": true,
                    "tokens_remaining": 12,
                    "current_rate": 10.0,
                    "backoff_remaining_secs": 3.5,
                    "metrics": {}
                }
            },
            "totals": {}
        }"#;
        let parsed: WorkersResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.running);
        assert_eq!(parsed.tenants["acme"].tokens_remaining, 12);
    }

    #[test]
    fn plain_output_lists_tenants() {
        let mut tenants = BTreeMap::new();
        tenants.insert(
            "acme".to_string(),
            TenantLine {
                running: true,
                tokens_remaining: 4,
                current_rate: 10.0,
                backoff_remaining_secs: 2.0,
            },
        );
        let status = StatusResponse {
            reachable: true,
            dispatch_running: true,
            uptime_secs: Some(3600),
            uptime_human: Some("1h 0m".to_string()),
            endpoint: "http://127.0.0.1:8640/v1/workers".to_string(),
            tenants,
        };
        let text = render_plain(&status);
        assert!(text.contains("[OK] dispatching (uptime: 1h 0m)"));
        assert!(text.contains("acme: 10.0 msg/s, 4 tokens, backoff 2.0s"));
    }

    #[test]
    fn plain_output_when_unreachable() {
        let status = StatusResponse {
            reachable: false,
            dispatch_running: false,
            uptime_secs: None,
            uptime_human: None,
            endpoint: "http://127.0.0.1:8640/v1/workers".to_string(),
            tenants: BTreeMap::new(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"reachable\":false"));
        assert!(render_plain(&status).contains("not running"));
    }
}
