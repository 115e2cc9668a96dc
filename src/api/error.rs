//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::agent::DiagnosisError;

/// Errors surfaced to HTTP callers.
///
/// A diagnosis that ran but could not conclude is not an error; it is a
/// normal `200` response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Diagnosis(#[from] DiagnosisError),
    #[error("failed to encode metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Diagnosis(_) => StatusCode::BAD_GATEWAY,
            ApiError::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Diagnosis(DiagnosisError::Connection(_)) => "connection_failed",
            ApiError::Diagnosis(DiagnosisError::Backend(_)) => "backend_failed",
            ApiError::Metrics(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorBody {
            error: self.code(),
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::BackendError;
    use crate::ssh::ConnectionError;

    #[test]
    fn test_status_mapping() {
        let invalid = ApiError::InvalidRequest("bad".to_string());
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.code(), "invalid_request");

        let conn = ApiError::from(DiagnosisError::from(ConnectionError::Timeout(10)));
        assert_eq!(conn.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(conn.code(), "connection_failed");

        let backend = ApiError::from(DiagnosisError::from(BackendError::EmptyResponse));
        assert_eq!(backend.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(backend.code(), "backend_failed");
    }
}
