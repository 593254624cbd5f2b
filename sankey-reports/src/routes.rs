//! HTTP routes for the report service.
//!
//! - `GET /health`, `GET /ready` — liveness and readiness
//! - `POST /api/v1/reports` — run the generation pipeline
//! - `GET /api/v1/reports/:fingerprint` — fetch a persisted record

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::{GenerateRequest, PipelineError, ReportPipeline};
use crate::snapshot::{FinancialSnapshot, ReportParameters};
use sankey_notify::DeliveryReceipt;
use sankey_store::{ReportRecord, ReportStore};

// ============================================================================
// State
// ============================================================================

/// Shared state for the report HTTP server.
pub struct ReportsState {
    /// The generation pipeline.
    pub pipeline: Arc<ReportPipeline>,
    /// Store handle for lookups and readiness checks.
    pub store: Arc<dyn ReportStore>,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    snapshot: FinancialSnapshot,
    #[serde(default)]
    parameters: ReportParameters,
    requester_id: String,
    #[serde(default = "default_tier")]
    tier: String,
    #[serde(default)]
    recipient: Option<String>,
    #[serde(default)]
    retry: bool,
    #[serde(default)]
    deadline_secs: Option<u64>,
}

fn default_tier() -> String {
    "free".into()
}

#[derive(Debug, Serialize)]
struct DeliveryResponse {
    delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    attempts: u32,
    already_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<DeliveryReceipt> for DeliveryResponse {
    fn from(receipt: DeliveryReceipt) -> Self {
        Self {
            delivered: receipt.delivered,
            provider: receipt.provider,
            attempts: receipt.attempts,
            already_sent: receipt.already_sent,
            error: receipt.error,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    report: ReportRecord,
    from_cache: bool,
    persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    delivery: Option<DeliveryResponse>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_secs: Option<u64>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "sankey-reports",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<Arc<ReportsState>>) -> impl IntoResponse {
    if state.store.health_check().await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ready",
                service: "sankey-reports",
                version: env!("CARGO_PKG_VERSION"),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready",
                service: "sankey-reports",
                version: env!("CARGO_PKG_VERSION"),
            }),
        )
    }
}

fn error_response(err: PipelineError) -> (StatusCode, Json<ErrorResponse>) {
    let (kind, retry_after_secs) = match &err {
        PipelineError::Timeout => ("timeout", None),
        PipelineError::Rejected(_) => ("rejected", None),
        PipelineError::RateLimited { retry_after_secs } => ("rate_limited", *retry_after_secs),
        PipelineError::QuotaExceeded { .. } => ("quota_exceeded", None),
        PipelineError::Upstream(_) => ("upstream", None),
    };
    let message = err.to_string();
    let common: sankey_common::Error = err.into();
    let status = StatusCode::from_u16(common.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: message,
            kind,
            retry_after_secs,
        }),
    )
}

async fn generate_report(
    State(state): State<Arc<ReportsState>>,
    Json(body): Json<GenerateBody>,
) -> impl IntoResponse {
    let request = GenerateRequest {
        snapshot: body.snapshot,
        parameters: body.parameters,
        requester_id: body.requester_id,
        tier: body.tier,
        recipient: body.recipient,
        retry: body.retry,
        deadline: body.deadline_secs.map(Duration::from_secs),
    };

    match state.pipeline.generate(request).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(GenerateResponse {
                report: outcome.report,
                from_cache: outcome.from_cache,
                persisted: outcome.persisted,
                delivery: outcome.delivery.map(DeliveryResponse::from),
            }),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn get_report(
    State(state): State<Arc<ReportsState>>,
    Path(fingerprint): Path<String>,
) -> impl IntoResponse {
    match state.store.find_report(&fingerprint).await {
        Ok(Some(record)) => (StatusCode::OK, Json(record)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No report for fingerprint {fingerprint}"),
                kind: "not_found",
                retry_after_secs: None,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: e.to_string(),
                kind: "store_unavailable",
                retry_after_secs: None,
            }),
        )
            .into_response(),
    }
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the report service router.
pub fn build_router(state: Arc<ReportsState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Report API
        .route("/api/v1/reports", post(generate_report))
        .route("/api/v1/reports/:fingerprint", get(get_report))
        .with_state(state)
}
