// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - a rate-limited multi-tenant outbound message dispatcher.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod control;
mod serve;
mod status;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use courier_config::CourierConfig;
use courier_core::CourierError;
use courier_dispatch::EnqueueRequest;
use courier_storage::SqliteStore;

/// Courier - a rate-limited multi-tenant outbound message dispatcher.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatcher and its control surface.
    Serve,
    /// Show the state of a running dispatcher.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Queue one message.
    Enqueue {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        body: String,
        /// Idempotency key, unique per tenant.
        #[arg(long)]
        key: String,
        /// Policy tag allowing delivery outside the activity window.
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        priority: i32,
    },
    /// Manage tenants stored in the queue database.
    Tenant {
        #[command(subcommand)]
        action: TenantCommands,
    },
    /// Return tasks stranded in `sending` to the queue.
    Reclaim {
        /// Claims older than this many seconds count as stranded.
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// List tenants with their effective rates.
    List,
    Enable { id: String },
    Disable { id: String },
    /// Set rate overrides for a tenant.
    Set {
        id: String,
        #[arg(long)]
        baseline_rate: Option<f64>,
        #[arg(long)]
        burst_ceiling: Option<u32>,
        #[arg(long)]
        hard_guardrail: Option<f64>,
        #[arg(long)]
        recipient_min_gap_secs: Option<f64>,
        #[arg(long)]
        max_backoff_secs: Option<f64>,
    },
    Remove { id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let Some(command) = cli.command else {
        println!("courier: use --help for available commands");
        return;
    };

    if let Err(e) = run(command, config, cli.config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(
    command: Commands,
    config: CourierConfig,
    config_path: Option<PathBuf>,
) -> Result<(), CourierError> {
    match command {
        Commands::Serve => serve::run_serve(config, config_path.as_deref()).await,
        Commands::Status { json } => status::run_status(&config, json).await,
        Commands::Enqueue {
            tenant,
            recipient,
            body,
            key,
            tag,
            priority,
        } => {
            let store = SqliteStore::open(&config.storage).await?;
            let request = EnqueueRequest {
                tenant_id: tenant,
                recipient_id: recipient,
                body,
                tag,
                priority,
                idempotency_key: key,
                not_before: None,
            };
            admin::enqueue(&store, &request).await?;
            store.close().await
        }
        Commands::Tenant { action } => {
            let store = SqliteStore::open(&config.storage).await?;
            match action {
                TenantCommands::List => {
                    admin::list_tenants(&store, &config).await?;
                }
                TenantCommands::Enable { id } => admin::set_enabled(&store, &id, true).await?,
                TenantCommands::Disable { id } => admin::set_enabled(&store, &id, false).await?,
                TenantCommands::Set {
                    id,
                    baseline_rate,
                    burst_ceiling,
                    hard_guardrail,
                    recipient_min_gap_secs,
                    max_backoff_secs,
                } => {
                    let flags = admin::RateFlags {
                        baseline_rate,
                        burst_ceiling,
                        hard_guardrail,
                        recipient_min_gap_secs,
                        max_backoff_secs,
                    };
                    admin::set_rates(&store, &config, &id, &flags).await?;
                }
                TenantCommands::Remove { id } => {
                    admin::remove(&store, &id).await?;
                }
            }
            store.close().await
        }
        Commands::Reclaim { older_than_secs } => {
            let older_than = older_than_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.worker.stale_claim());
            let store = SqliteStore::open(&config.storage).await?;
            admin::reclaim(&store, older_than).await?;
            store.close().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn default_config_is_valid() {
        let config = courier_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.daemon.control_bind, "127.0.0.1:8640");
    }

    #[test]
    #[serial_test::serial]
    fn config_file_with_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.toml");
        std::fs::write(&path, "[daemon]\nlog_level = \"debug\"\n").unwrap();

        // SAFETY: serialized with every other test touching the environment.
        unsafe { std::env::set_var("COURIER_DAEMON_CONTROL_BIND", "127.0.0.1:9999") };
        let loaded = courier_config::load_and_validate_path(&path);
        unsafe { std::env::remove_var("COURIER_DAEMON_CONTROL_BIND") };

        let config = loaded.expect("config should load");
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.control_bind, "127.0.0.1:9999");
    }

    #[test]
    fn cli_parses_tenant_set() {
        let cli = Cli::try_parse_from([
            "courier",
            "tenant",
            "set",
            "acme",
            "--baseline-rate",
            "5",
            "--burst-ceiling",
            "10",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Tenant {
                action:
                    TenantCommands::Set {
                        id,
                        baseline_rate,
                        burst_ceiling,
                        ..
                    },
            }) => {
                assert_eq!(id, "acme");
                assert_eq!(baseline_rate, Some(5.0));
                assert_eq!(burst_ceiling, Some(10));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_accepts_negative_priority_and_global_config() {
        let cli = Cli::try_parse_from([
            "courier",
            "enqueue",
            "--tenant",
            "acme",
            "--recipient",
            "r1",
            "--body",
            "hi",
            "--key",
            "k1",
            "--priority",
            "-5",
            "--config",
            "/tmp/courier.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/courier.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Enqueue { priority: -5, .. })
        ));
    }
}
