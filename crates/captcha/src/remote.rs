//! Remote solving-service challenge provider.
//!
//! Submits a solve task (site parameters plus action label) to an
//! external service, then polls for the solved value. Stateless and
//! horizontally shared: any number of acquisitions may run
//! concurrently, bounded only by the service's own limits.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::token::ChallengeToken;
use crate::{CaptchaError, ChallengeProvider};

#[derive(Debug, Clone)]
pub struct RemoteSolverConfig {
    /// Base URL of the solving service.
    pub api_url: String,
    /// Service account key.
    pub client_key: String,
    /// Site key of the challenge to solve.
    pub site_key: String,
    /// URL of the page that hosts the challenge.
    pub page_url: String,
    /// Delay between result polls.
    pub poll_interval: Duration,
    /// Bound on the whole solve.
    pub solve_timeout: Duration,
}

impl RemoteSolverConfig {
    pub fn new(api_url: String, client_key: String, site_key: String, page_url: String) -> Self {
        Self {
            api_url,
            client_key,
            site_key,
            page_url,
            poll_interval: Duration::from_secs(3),
            solve_timeout: Duration::from_secs(90),
        }
    }
}

pub struct RemoteSolverProvider {
    client: reqwest::Client,
    config: RemoteSolverConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskResponse {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    task_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskResultResponse {
    #[serde(default)]
    error_id: i64,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    solution: Option<TaskSolution>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskSolution {
    g_recaptcha_response: Option<String>,
}

impl RemoteSolverProvider {
    pub fn new(config: RemoteSolverConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, config: RemoteSolverConfig) -> Self {
        Self { client, config }
    }

    async fn create_task(&self, action: &str) -> Result<i64, CaptchaError> {
        let body = serde_json::json!({
            "clientKey": self.config.client_key,
            "task": {
                "type": "RecaptchaV3TaskProxyless",
                "websiteURL": self.config.page_url,
                "websiteKey": self.config.site_key,
                "pageAction": action,
            },
        });

        let response: CreateTaskResponse = self
            .client
            .post(format!("{}/createTask", self.config.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CaptchaError::AcquisitionFailed(format!("solver request failed: {e}")))?
            .json()
            .await
            .map_err(|e| CaptchaError::AcquisitionFailed(format!("solver response invalid: {e}")))?;

        if response.error_id != 0 {
            return Err(CaptchaError::AcquisitionFailed(format!(
                "solver rejected task: {}",
                response.error_description.unwrap_or_default()
            )));
        }

        response.task_id.ok_or_else(|| {
            CaptchaError::AcquisitionFailed("solver returned no task id".to_string())
        })
    }

    async fn poll_result(&self, task_id: i64, action: &str) -> Result<ChallengeToken, CaptchaError> {
        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let body = serde_json::json!({
                "clientKey": self.config.client_key,
                "taskId": task_id,
            });
            let response: TaskResultResponse = self
                .client
                .post(format!("{}/getTaskResult", self.config.api_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    CaptchaError::AcquisitionFailed(format!("solver poll failed: {e}"))
                })?
                .json()
                .await
                .map_err(|e| {
                    CaptchaError::AcquisitionFailed(format!("solver response invalid: {e}"))
                })?;

            if response.error_id != 0 {
                return Err(CaptchaError::AcquisitionFailed(format!(
                    "solver task failed: {}",
                    response.error_description.unwrap_or_default()
                )));
            }

            match response.status.as_deref() {
                Some("ready") => {
                    let value = response
                        .solution
                        .and_then(|s| s.g_recaptcha_response)
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| {
                            CaptchaError::AcquisitionFailed(
                                "solver returned an empty solution".to_string(),
                            )
                        })?;
                    return Ok(ChallengeToken::new(value, action.to_string()));
                }
                Some("processing") | None => continue,
                Some(other) => {
                    return Err(CaptchaError::AcquisitionFailed(format!(
                        "solver reported unexpected status '{other}'"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl ChallengeProvider for RemoteSolverProvider {
    async fn acquire_token(&self, action: &str) -> Result<ChallengeToken, CaptchaError> {
        let timeout = self.config.solve_timeout;
        let solve = async {
            let task_id = self.create_task(action).await?;
            tracing::debug!(task_id, action, "Solve task submitted");
            self.poll_result(task_id, action).await
        };

        match tokio::time::timeout(timeout, solve).await {
            Ok(result) => result,
            Err(_elapsed) => Err(CaptchaError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::routing::post;
    use axum::{Json, Router};

    /// Serve a stub solver on an ephemeral port.
    async fn spawn_solver(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(api_url: String) -> RemoteSolverConfig {
        let mut config = RemoteSolverConfig::new(
            api_url,
            "client-key".to_string(),
            "site-key".to_string(),
            "https://challenge.example/".to_string(),
        );
        config.poll_interval = Duration::from_millis(10);
        config.solve_timeout = Duration::from_secs(5);
        config
    }

    #[tokio::test]
    async fn solves_after_processing_polls() {
        let router = Router::new()
            .route(
                "/createTask",
                post(|| async { Json(serde_json::json!({"errorId": 0, "taskId": 7})) }),
            )
            .route(
                "/getTaskResult",
                post({
                    let polls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
                    move || {
                        let polls = std::sync::Arc::clone(&polls);
                        async move {
                            let n = polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                            if n == 0 {
                                Json(serde_json::json!({"errorId": 0, "status": "processing"}))
                            } else {
                                Json(serde_json::json!({
                                    "errorId": 0,
                                    "status": "ready",
                                    "solution": {"gRecaptchaResponse": "tok-123"},
                                }))
                            }
                        }
                    }
                }),
            );
        let url = spawn_solver(router).await;

        let provider = RemoteSolverProvider::new(config(url));
        let token = provider.acquire_token("video_generation").await.unwrap();
        assert_eq!(token.action(), "video_generation");
        assert_eq!(token.into_value(), "tok-123");
    }

    #[tokio::test]
    async fn service_error_is_acquisition_failed() {
        let router = Router::new().route(
            "/createTask",
            post(|| async {
                Json(serde_json::json!({
                    "errorId": 1,
                    "errorDescription": "ERROR_KEY_DOES_NOT_EXIST",
                }))
            }),
        );
        let url = spawn_solver(router).await;

        let provider = RemoteSolverProvider::new(config(url));
        let err = provider.acquire_token("video_generation").await.unwrap_err();
        assert_matches!(err, CaptchaError::AcquisitionFailed(msg) if msg.contains("ERROR_KEY_DOES_NOT_EXIST"));
    }

    #[tokio::test]
    async fn slow_solver_times_out() {
        let router = Router::new()
            .route(
                "/createTask",
                post(|| async { Json(serde_json::json!({"errorId": 0, "taskId": 1})) }),
            )
            .route(
                "/getTaskResult",
                post(|| async { Json(serde_json::json!({"errorId": 0, "status": "processing"})) }),
            );
        let url = spawn_solver(router).await;

        let mut config = config(url);
        config.solve_timeout = Duration::from_millis(50);
        let provider = RemoteSolverProvider::new(config);

        let err = provider.acquire_token("video_generation").await.unwrap_err();
        assert_matches!(err, CaptchaError::Timeout(_));
    }

    #[tokio::test]
    async fn unreachable_service_fails() {
        let provider = RemoteSolverProvider::new(config("http://127.0.0.1:9".to_string()));
        let err = provider.acquire_token("video_generation").await.unwrap_err();
        assert_matches!(err, CaptchaError::AcquisitionFailed(_));
    }
}
