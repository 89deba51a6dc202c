//! Error mapping shared by the HTTP handlers.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use eventline_ingest::IngestError;
use eventline_metrics::MetricsError;
use eventline_types::ValidationError;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return ApiError::PayloadTooLarge(rejection.body_text());
        }
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        if e.is_caller_fault() {
            return ApiError::BadRequest(e.to_string());
        }
        if let IngestError::DeadlineExceeded(_) = e {
            tracing::error!("publish deadline exceeded: {}", e);
            return ApiError::GatewayTimeout("broker did not acknowledge in time".to_string());
        }
        tracing::error!(index = e.index(), "failed to publish events: {}", e);
        ApiError::InternalServerError("internal server error".to_string())
    }
}

impl From<MetricsError> for ApiError {
    fn from(e: MetricsError) -> Self {
        if e.is_timeout() {
            tracing::error!("metrics query deadline exceeded: {}", e);
            return ApiError::GatewayTimeout("metrics query timed out".to_string());
        }
        tracing::error!("failed to fetch metrics: {}", e);
        ApiError::InternalServerError("failed to fetch metrics".to_string())
    }
}
