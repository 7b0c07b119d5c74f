use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use flowgate_core::error::GatewayError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`GatewayError`] for pipeline errors and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON
/// error responses of the shape `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A pipeline error, already classified.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The requested model key is not in the catalog.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Gateway(err) => (gateway_status(err), err.code(), err.to_string()),
            AppError::UnknownModel(model) => (
                StatusCode::NOT_FOUND,
                "MODEL_NOT_FOUND",
                format!("Unknown model: {model}"),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        if status.is_server_error() {
            tracing::error!(code, error = %message, "Request failed");
        }

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// HTTP status for each pipeline error class. Caller-retryable
/// conditions map to 503 so well-behaved clients back off and retry.
fn gateway_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::UnknownMediaReference(_) => StatusCode::NOT_FOUND,
        GatewayError::NoCredentialAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::ChallengeAcquisitionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::UpstreamAuthRejected(_) => StatusCode::BAD_GATEWAY,
        GatewayError::UpstreamTransient(_) => StatusCode::BAD_GATEWAY,
        GatewayError::UpstreamTerminal(_) => StatusCode::BAD_GATEWAY,
    }
}
