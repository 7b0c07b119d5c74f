//! Model listing endpoint, OpenAI list shape.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn list_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    let data: Vec<_> = state
        .catalog
        .keys()
        .into_iter()
        .map(|key| {
            json!({
                "id": key,
                "object": "model",
                "owned_by": "flowgate",
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
    }))
}
