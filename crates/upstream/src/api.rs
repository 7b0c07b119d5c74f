//! REST client for the upstream generation endpoints.
//!
//! Wraps the three calls the orchestrator needs — standard submission,
//! extension submission, and status polling — using [`reqwest`].
//! Non-2xx responses are classified into the retry taxonomy by
//! [`crate::error::classify_response`].

use std::time::Duration;

use crate::error::UpstreamError;
use crate::payload::{
    OperationRef, OperationStatus, PollPayload, PollResponse, SubmitPayload, SubmitResponse,
};

/// Per-request ceiling for clients built by [`FlowApi::new`]. The
/// upstream has been seen accepting a connection and never answering;
/// without this a single call can outlive the job it belongs to.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one upstream deployment.
pub struct FlowApi {
    client: reqwest::Client,
    base_url: String,
}

impl FlowApi {
    /// * `base_url` - e.g. `https://generation.example/api`.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("default HTTP client configuration is valid");
        Self { client, base_url }
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Submit a standard generation request. Returns the server's job
    /// handles.
    pub async fn submit_generation(
        &self,
        session_token: &str,
        payload: &SubmitPayload,
    ) -> Result<SubmitResponse, UpstreamError> {
        self.submit(session_token, payload, "v1/video:batchAsyncGenerate")
            .await
    }

    /// Submit an extension request referencing a prior clip.
    pub async fn submit_extension(
        &self,
        session_token: &str,
        payload: &SubmitPayload,
    ) -> Result<SubmitResponse, UpstreamError> {
        self.submit(session_token, payload, "v1/video:batchAsyncExtend")
            .await
    }

    /// Poll a job by its operation name.
    pub async fn poll_operation(
        &self,
        session_token: &str,
        operation_name: &str,
    ) -> Result<OperationStatus, UpstreamError> {
        let payload = PollPayload {
            operations: vec![OperationRef {
                name: operation_name.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/video:batchCheckAsyncVideoGenerationStatus",
                self.base_url
            ))
            .bearer_auth(session_token)
            .json(&payload)
            .send()
            .await?;

        let mut parsed: PollResponse = Self::parse_response(response).await?;
        if parsed.operations.is_empty() {
            return Err(UpstreamError::Terminal {
                status: 200,
                message: format!("poll returned no status for operation {operation_name}"),
            });
        }
        Ok(parsed.operations.swap_remove(0))
    }

    // ---- private helpers ----

    async fn submit(
        &self,
        session_token: &str,
        payload: &SubmitPayload,
        path: &str,
    ) -> Result<SubmitResponse, UpstreamError> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(session_token)
            .json(payload)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Classify non-2xx responses, otherwise parse the JSON body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, UpstreamError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(crate::error::classify_response(status.as_u16(), &body));
        }
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::payload::{ClientContext, OperationState, TextInput, VideoRequest};
    use assert_matches::assert_matches;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn spawn_upstream(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn payload() -> SubmitPayload {
        SubmitPayload {
            client_context: ClientContext {
                session_token: "st-1".to_string(),
                session_id: "sess-1".to_string(),
                challenge_token: "tok-1".to_string(),
                tool: "PINHOLE".to_string(),
            },
            requests: vec![VideoRequest {
                video_model_key: "veo_3_0_t2v_fast".to_string(),
                aspect_ratio: "VIDEO_ASPECT_RATIO_LANDSCAPE".to_string(),
                text_input: TextInput {
                    prompt: "a cat".to_string(),
                },
                video_input: None,
            }],
        }
    }

    #[tokio::test]
    async fn submit_returns_operation_name() {
        let router = Router::new().route(
            "/v1/video:batchAsyncGenerate",
            post(|| async {
                Json(serde_json::json!({
                    "operations": [{"operation": {"name": "op-77"}}]
                }))
            }),
        );
        let url = spawn_upstream(router).await;

        let api = FlowApi::new(url);
        let response = api.submit_generation("st-1", &payload()).await.unwrap();
        assert_eq!(response.operation_name(), Some("op-77"));
    }

    #[tokio::test]
    async fn poll_parses_terminal_status() {
        let router = Router::new().route(
            "/v1/video:batchCheckAsyncVideoGenerationStatus",
            post(|| async {
                Json(serde_json::json!({
                    "operations": [{
                        "operation": {"name": "op-77"},
                        "status": "MEDIA_GENERATION_STATUS_SUCCESSFUL",
                        "media": {"mediaId": "M1", "fifeUrl": "https://media.example/M1"}
                    }]
                }))
            }),
        );
        let url = spawn_upstream(router).await;

        let api = FlowApi::new(url);
        let status = api.poll_operation("st-1", "op-77").await.unwrap();
        assert_eq!(status.status, OperationState::Succeeded);
        assert_eq!(status.media.unwrap().media_id, "M1");
    }

    #[tokio::test]
    async fn unauthorized_submission_is_auth_class() {
        let router = Router::new().route(
            "/v1/video:batchAsyncGenerate",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(serde_json::json!({"error": {"message": "token rejected"}})),
                )
            }),
        );
        let url = spawn_upstream(router).await;

        let api = FlowApi::new(url);
        let err = api.submit_generation("st-1", &payload()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Auth);
    }

    #[tokio::test]
    async fn hung_request_times_out_as_transient() {
        let router = Router::new().route(
            "/v1/video:batchCheckAsyncVideoGenerationStatus",
            post(|| async {
                std::future::pending::<()>().await;
                Json(serde_json::json!({}))
            }),
        );
        let url = spawn_upstream(router).await;

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(50))
            .build()
            .unwrap();
        let api = FlowApi::with_client(client, url);
        let err = api.poll_operation("st-1", "op-1").await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn connection_failure_is_transient() {
        let api = FlowApi::new("http://127.0.0.1:9".to_string());
        let err = api.submit_generation("st-1", &payload()).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn empty_poll_response_is_terminal() {
        let router = Router::new().route(
            "/v1/video:batchCheckAsyncVideoGenerationStatus",
            post(|| async { Json(serde_json::json!({"operations": []})) }),
        );
        let url = spawn_upstream(router).await;

        let api = FlowApi::new(url);
        let err = api.poll_operation("st-1", "op-1").await.unwrap_err();
        assert_matches!(err, UpstreamError::Terminal { .. });
    }
}
