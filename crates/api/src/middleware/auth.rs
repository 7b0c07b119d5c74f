//! Static bearer key authentication for the `/v1` routes.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::state::AppState;

/// Reject requests whose `Authorization: Bearer` key does not match
/// the configured API key. With no key configured the check is
/// disabled.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if presented == Some(expected) {
        return next.run(request).await;
    }

    // The presented value is never logged or echoed back.
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(json!({
            "error": "Invalid or missing API key",
            "code": "UNAUTHORIZED",
        })),
    )
        .into_response()
}
