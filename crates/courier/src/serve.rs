// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Opens the queue database, wires the tenant config provider, the Graph
//! provider and the worker supervisor together, serves the control surface
//! and runs until SIGTERM/SIGINT.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use courier_config::{ConfigProvider, CourierConfig, FileTenantSource, TenantSourceKind};
use courier_core::{CourierError, QueueStore, TenantConfigSource};
use courier_dispatch::{DispatchDeps, ErrorClassifier, WorkerSupervisor, shutdown};
use courier_graph::GraphProvider;
use courier_storage::SqliteStore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(feature = "prometheus")]
use courier_prometheus::PrometheusAdapter;

use crate::control::{self, ControlState, MetricsRender};

/// Runs the `courier serve` command.
pub async fn run_serve(config: CourierConfig, config_path: Option<&Path>) -> Result<(), CourierError> {
    init_tracing(&config.daemon.log_level, &config.daemon.log_format);

    info!(
        database = %config.storage.database_path,
        control_bind = %config.daemon.control_bind,
        "starting courier serve"
    );

    let store = Arc::new(SqliteStore::open(&config.storage).await?);

    let source: Arc<dyn TenantConfigSource> = match config.worker.tenant_source {
        TenantSourceKind::Database => store.clone(),
        TenantSourceKind::File => match config_path {
            Some(path) => Arc::new(FileTenantSource::from_path(path)),
            None => Arc::new(FileTenantSource::from_config(&config)),
        },
    };
    let provider_config = Arc::new(ConfigProvider::new(config.dispatch.clone(), source));
    match provider_config.refresh().await {
        Ok(count) => info!(tenants = count, "tenant configuration loaded"),
        Err(e) => warn!(error = %e, "initial tenant configuration load failed"),
    }

    let graph = Arc::new(GraphProvider::from_config(&config.provider)?);

    #[cfg(feature = "prometheus")]
    let metrics: Option<MetricsRender> = {
        let adapter = Arc::new(PrometheusAdapter::new()?);
        Some(Arc::new(move || adapter.render()))
    };
    #[cfg(not(feature = "prometheus"))]
    let metrics: Option<MetricsRender> = None;

    let deps = DispatchDeps {
        store: store.clone(),
        provider: graph,
        config: provider_config,
        classifier: Arc::new(ErrorClassifier::from_config(&config.provider)),
        worker: config.worker.clone(),
    };
    let supervisor = WorkerSupervisor::new(
        deps,
        Duration::from_secs(config.daemon.shutdown_grace_secs),
    );

    let status = supervisor.start().await;
    info!(tenants = status.active_tenants.len(), "dispatch started");

    let queue: Arc<dyn QueueStore> = store.clone();
    let app = control::router(ControlState {
        supervisor: supervisor.clone(),
        store: queue,
        metrics,
        started: Instant::now(),
    });

    let listener = tokio::net::TcpListener::bind(&config.daemon.control_bind)
        .await
        .map_err(|e| {
            CourierError::Internal(format!(
                "failed to bind control surface on {}: {e}",
                config.daemon.control_bind
            ))
        })?;
    info!(addr = %config.daemon.control_bind, "control surface listening");

    let server_cancel = CancellationToken::new();
    let server_token = server_cancel.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    let signal = shutdown::install_signal_handler();
    let mut server_done = false;
    tokio::select! {
        _ = signal.cancelled() => {
            info!("shutdown signal received");
        }
        result = &mut server => {
            server_done = true;
            match result {
                Ok(Ok(())) => warn!("control surface exited"),
                Ok(Err(e)) => error!(error = %e, "control surface failed"),
                Err(e) => error!(error = %e, "control surface task panicked"),
            }
        }
    }

    supervisor.stop().await;

    server_cancel.cancel();
    if !server_done {
        match tokio::time::timeout(Duration::from_secs(5), server).await {
            Ok(Ok(Err(e))) => warn!(error = %e, "control surface shutdown error"),
            Ok(Err(e)) => warn!(error = %e, "control surface task panicked"),
            Err(_) => warn!("control surface did not stop in time"),
            Ok(Ok(Ok(()))) => {}
        }
    }

    if let Err(e) = store.checkpoint().await {
        warn!(error = %e, "final WAL checkpoint failed");
    }

    info!("courier stopped");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
pub(crate) fn init_tracing(log_level: &str, log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false);

    let result = if log_format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_err() {
        eprintln!("courier: tracing subscriber already installed");
    }
}
