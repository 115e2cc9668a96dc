//! HTTP routes

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use super::dto::{DiagnoseRequestDto, DiagnoseResponseDto, HealthResponse};
use super::error::ApiError;
use super::AppState;
use crate::metrics::gather_text;

type AppStateArc = Arc<AppState>;

/// Header carrying the session trace ID on successful diagnoses
pub const TRACE_ID_HEADER: &str = "x-trace-id";

// ============================================================================
// Diagnosis Routes
// ============================================================================

pub fn diagnosis_routes() -> Router<AppStateArc> {
    Router::new().route("/", post(diagnose))
}

async fn diagnose(
    State(state): State<AppStateArc>,
    payload: Result<Json<DiagnoseRequestDto>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(dto) = payload.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    let request = dto.into_request()?;
    info!(host = %request.target.host, user = %request.requester, "Diagnosis requested");

    let report = state.service.diagnose(request).await?;
    let trace_id = report.trace_id.clone();

    Ok((
        [(TRACE_ID_HEADER, trace_id)],
        Json(DiagnoseResponseDto::from(report)),
    )
        .into_response())
}

// ============================================================================
// Operational Routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn metrics() -> Result<Response, ApiError> {
    let body = gather_text()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
