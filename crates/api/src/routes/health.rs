//! Health and pool status endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Liveness plus a sanitized view of the credential pool. Raw session
/// tokens never appear here.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let credentials = state.pool.snapshot().await;
    let enabled = credentials.iter().filter(|c| c.enabled).count();

    Json(json!({
        "status": "ok",
        "models": state.catalog.len(),
        "credentials": {
            "total": credentials.len(),
            "enabled": enabled,
            "detail": credentials,
        },
    }))
}
