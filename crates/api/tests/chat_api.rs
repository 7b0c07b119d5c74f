//! End-to-end tests for the chat-completions surface.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{build_test_app, spawn_upstream, standard_credentials, success_upstream, TEST_API_KEY};

fn chat_request(model: &str, prompt: &str, stream: bool) -> Request<Body> {
    let body = serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
        "stream": stream,
    });
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn completion_returns_video_url_and_continuation_hint() {
    let url = spawn_upstream(success_upstream()).await;
    let (app, _pool) = build_test_app(&url, standard_credentials(1)).await;

    let response = app
        .oneshot(chat_request("veo-3-fast-landscape", "a cat in the rain", false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["object"], "chat.completion");
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("https://media.example/"));
    assert!(content.contains("[video_id:media-op-"));
    assert!(content.contains("start_frame:168,end_frame:191"));
}

#[tokio::test]
async fn streaming_completion_emits_chunks_and_done() {
    let url = spawn_upstream(success_upstream()).await;
    let (app, _pool) = build_test_app(&url, standard_credentials(1)).await;

    let response = app
        .oneshot(chat_request("veo-3-fast-landscape", "a cat", true))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("chat.completion.chunk"));
    assert!(text.contains("\"role\":\"assistant\""));
    assert!(text.contains("https://media.example/"));
    assert!(text.contains("data: [DONE]"));
}

#[tokio::test]
async fn generate_then_extend_through_the_api() {
    let url = spawn_upstream(success_upstream()).await;
    let (app, _pool) = build_test_app(&url, standard_credentials(1)).await;

    let response = app
        .clone()
        .oneshot(chat_request("veo-3-fast-landscape", "a cat", false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();

    // Lift the continuation annotation out of the first completion.
    let annotation_start = content.find("[video_id:").unwrap();
    let annotation_end = content[annotation_start..].find(']').unwrap();
    let annotation = &content[annotation_start..=annotation_start + annotation_end];

    let response = app
        .oneshot(chat_request(
            "veo-3-fast-landscape-extend",
            &format!("keep panning {annotation}"),
            false,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("https://media.example/op-ext-"));
}

#[tokio::test]
async fn unknown_model_is_not_found() {
    let url = spawn_upstream(success_upstream()).await;
    let (app, _pool) = build_test_app(&url, standard_credentials(1)).await;

    let response = app
        .oneshot(chat_request("veo-9000", "a cat", false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["code"], "MODEL_NOT_FOUND");
}

#[tokio::test]
async fn annotation_on_standard_model_is_rejected() {
    let url = spawn_upstream(success_upstream()).await;
    let (app, _pool) = build_test_app(&url, standard_credentials(1)).await;

    let response = app
        .oneshot(chat_request(
            "veo-3-fast-landscape",
            "a cat [video_id:ABC,start_frame:0,end_frame:10]",
            false,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn missing_user_message_is_a_bad_request() {
    let url = spawn_upstream(success_upstream()).await;
    let (app, _pool) = build_test_app(&url, standard_credentials(1)).await;

    let body = serde_json::json!({
        "model": "veo-3-fast-landscape",
        "messages": [{"role": "system", "content": "be brief"}],
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {TEST_API_KEY}"))
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn exhausted_tier_is_service_unavailable() {
    let url = spawn_upstream(success_upstream()).await;
    // Standard credentials only; the quality model needs elevated.
    let (app, _pool) = build_test_app(&url, standard_credentials(1)).await;

    let response = app
        .oneshot(chat_request("veo-3-quality-landscape", "a cat", false))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["code"], "NO_CREDENTIAL_AVAILABLE");
}
