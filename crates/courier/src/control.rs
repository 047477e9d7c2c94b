// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operational control surface.
//!
//! A small axum router exposing health, Prometheus metrics, supervisor
//! start/stop/status, enqueue, task lookup and recipient activity.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::debug;

use courier_core::{
    CourierError, EnqueueOutcome, HealthStatus, PluginAdapter, QueueStore, RecipientId, TaskId,
    TenantId,
};
use courier_dispatch::{EnqueueRequest, WorkerSupervisor};

/// Renders the metrics exposition text.
pub type MetricsRender = Arc<dyn Fn() -> String + Send + Sync>;

/// Shared state for every handler.
#[derive(Clone)]
pub struct ControlState {
    pub supervisor: WorkerSupervisor,
    pub store: Arc<dyn QueueStore>,
    pub metrics: Option<MetricsRender>,
    pub started: Instant,
}

/// Builds the control router.
pub fn router(state: ControlState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .route("/v1/workers", get(get_workers))
        .route("/v1/workers/start", post(post_workers_start))
        .route("/v1/workers/stop", post(post_workers_stop))
        .route("/v1/tenants/{tenant}/start", post(post_tenant_start))
        .route("/v1/tenants/{tenant}/inbound", post(post_tenant_inbound))
        .route("/v1/tasks", post(post_tasks))
        .route("/v1/tasks/{id}", get(get_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// A [`CourierError`] rendered as a JSON response.
pub struct ApiError(CourierError);

impl From<CourierError> for ApiError {
    fn from(e: CourierError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CourierError::Validation(_) => StatusCode::BAD_REQUEST,
            CourierError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            CourierError::NotRunning
            | CourierError::DuplicateKey { .. }
            | CourierError::InvalidTransition { .. } => StatusCode::CONFLICT,
            CourierError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Response body for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub dispatch_running: bool,
}

/// GET /health
async fn get_health(State(state): State<ControlState>) -> Json<HealthResponse> {
    let status = match state.store.health_check().await {
        Ok(HealthStatus::Healthy) => "healthy",
        _ => "degraded",
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started.elapsed().as_secs(),
        dispatch_running: state.supervisor.is_running().await,
    })
}

/// GET /metrics
async fn get_metrics(State(state): State<ControlState>) -> Response {
    match &state.metrics {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled\n").into_response(),
    }
}

/// GET /v1/workers
async fn get_workers(State(state): State<ControlState>) -> Response {
    Json(state.supervisor.status().await).into_response()
}

/// POST /v1/workers/start
async fn post_workers_start(State(state): State<ControlState>) -> Response {
    Json(state.supervisor.start().await).into_response()
}

/// POST /v1/workers/stop
async fn post_workers_stop(State(state): State<ControlState>) -> Response {
    let was_running = state.supervisor.stop().await;
    debug!(was_running, "stop requested over control surface");
    Json(state.supervisor.status().await).into_response()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TenantStartResponse {
    pub tenant_id: String,
    pub started: bool,
}

/// POST /v1/tenants/{tenant}/start
async fn post_tenant_start(
    State(state): State<ControlState>,
    Path(tenant): Path<String>,
) -> Result<Json<TenantStartResponse>, ApiError> {
    let started = state
        .supervisor
        .start_for_tenant(&TenantId(tenant.clone()))
        .await?;
    Ok(Json(TenantStartResponse {
        tenant_id: tenant,
        started,
    }))
}

/// Request body for POST /v1/tenants/{tenant}/inbound.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundRequest {
    pub recipient_id: String,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// POST /v1/tenants/{tenant}/inbound
async fn post_tenant_inbound(
    State(state): State<ControlState>,
    Path(tenant): Path<String>,
    Json(body): Json<InboundRequest>,
) -> Result<StatusCode, ApiError> {
    if body.recipient_id.trim().is_empty() {
        return Err(CourierError::Validation("recipient_id must not be empty".into()).into());
    }
    state
        .store
        .record_inbound(
            &TenantId(tenant),
            &RecipientId(body.recipient_id),
            body.at.unwrap_or_else(Utc::now),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/tasks
///
/// Enqueues, then makes sure the tenant's loop runs. The loop check is
/// best effort: the task is durable either way.
async fn post_tasks(
    State(state): State<ControlState>,
    Json(body): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueOutcome>), ApiError> {
    let outcome = courier_dispatch::enqueue(state.store.as_ref(), &body).await?;
    if let Err(e) = state
        .supervisor
        .start_for_tenant(&TenantId(body.tenant_id.clone()))
        .await
    {
        debug!(tenant_id = %body.tenant_id, error = %e, "no dispatch loop for tenant");
    }
    let status = match outcome {
        EnqueueOutcome::Enqueued(_) => StatusCode::CREATED,
        EnqueueOutcome::Duplicate(_) => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// GET /v1/tasks/{id}
async fn get_task(
    State(state): State<ControlState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let id = TaskId(id);
    match state.store.get_task(id).await? {
        Some(task) => Ok(Json(task).into_response()),
        None => Err(CourierError::TaskNotFound(id).into()),
    }
}
