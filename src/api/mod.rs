//! HTTP API
//!
//! ```text
//! POST /         → DiagnosisService::diagnose → 200 report | 400 | 502
//! GET  /health   → {"status":"ok"}
//! GET  /metrics  → Prometheus text format
//! ```

pub mod dto;
pub mod error;
pub mod routes;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tracing::{info, warn};

use crate::agent::DiagnosisService;

pub use dto::{DiagnoseRequestDto, DiagnoseResponseDto};
pub use error::ApiError;

/// Application state shared across handlers
pub struct AppState {
    pub service: DiagnosisService,
}

impl AppState {
    pub fn new(service: DiagnosisService) -> Self {
        Self { service }
    }
}

/// Build the router with all routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::diagnosis_routes())
        .merge(routes::health_routes())
        .with_state(Arc::new(state))
}

/// Serve the API until Ctrl-C
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Could not listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await
        }
    }
}
