pub mod chat;
pub mod health;
pub mod models;

use axum::routing::{get, post};
use axum::Router;

use crate::middleware::auth::require_api_key;
use crate::state::AppState;

/// The authenticated `/v1` route tree.
pub fn v1_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/chat/completions", post(chat::create_chat_completion))
        .route("/models", get(models::list_models))
        .layer(axum::middleware::from_fn_with_state(state, require_api_key))
}
