//! Shared helpers for the API integration tests.
//!
//! Builds the full application router through the same
//! `build_app_router` the production binary uses, wired to a stubbed
//! upstream service and a static challenge provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::routing::post;
use axum::{Json, Router};

use flowgate_api::config::{CaptchaBackend, ServerConfig};
use flowgate_api::router::build_app_router;
use flowgate_api::state::AppState;
use flowgate_captcha::{CaptchaError, ChallengeProvider, ChallengeToken};
use flowgate_core::catalog::ModelCatalog;
use flowgate_core::media::MediaTracker;
use flowgate_core::types::Tier;
use flowgate_pipeline::{Orchestrator, OrchestratorConfig};
use flowgate_pool::{Credential, CredentialPool, PoolConfig};
use flowgate_upstream::backoff::PollSchedule;
use flowgate_upstream::FlowApi;

pub const TEST_API_KEY: &str = "test-key";

pub struct StaticChallenges;

#[async_trait]
impl ChallengeProvider for StaticChallenges {
    async fn acquire_token(&self, action: &str) -> Result<ChallengeToken, CaptchaError> {
        Ok(ChallengeToken::new("tok-test".to_string(), action.to_string()))
    }
}

/// Stub upstream: both submissions succeed and every job completes on
/// the first poll, with the media id derived from the operation name.
pub fn success_upstream() -> Router {
    let generate = post(|| async {
        Json(serde_json::json!({
            "operations": [{"operation": {"name": format!("op-{}", uuid::Uuid::new_v4())}}]
        }))
    });
    let extend = post(|| async {
        Json(serde_json::json!({
            "operations": [{"operation": {"name": format!("op-ext-{}", uuid::Uuid::new_v4())}}]
        }))
    });
    let poll = post(|Json(body): Json<serde_json::Value>| async move {
        let name = body["operations"][0]["name"].as_str().unwrap_or("op").to_string();
        Json(serde_json::json!({
            "operations": [{
                "operation": {"name": name},
                "status": "MEDIA_GENERATION_STATUS_SUCCESSFUL",
                "media": {
                    "mediaId": format!("media-{name}"),
                    "fifeUrl": format!("https://media.example/{name}")
                }
            }]
        }))
    });

    Router::new()
        .route("/v1/video:batchAsyncGenerate", generate)
        .route("/v1/video:batchAsyncExtend", extend)
        .route("/v1/video:batchCheckAsyncVideoGenerationStatus", poll)
}

pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Test `ServerConfig` with auth enabled and a remote captcha backend
/// (never contacted; the test orchestrator gets a static provider).
pub fn test_config(upstream_url: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        api_key: Some(TEST_API_KEY.to_string()),
        upstream_url: upstream_url.to_string(),
        credentials_file: "unused".to_string(),
        model_catalog_file: None,
        cors_origins: Vec::new(),
        request_timeout_secs: 30,
        generation_timeout_secs: 10,
        exclusive_pool: false,
        unknown_reference_policy: Default::default(),
        captcha: CaptchaBackend::Remote {
            api_url: "http://127.0.0.1:9".to_string(),
            client_key: "unused".to_string(),
            site_key: "unused".to_string(),
            page_url: "http://127.0.0.1:9".to_string(),
        },
    }
}

/// Full application wired to the given upstream, with the production
/// middleware stack.
pub async fn build_test_app(
    upstream_url: &str,
    credentials: Vec<Credential>,
) -> (Router, Arc<CredentialPool>) {
    let config = test_config(upstream_url);
    let pool = CredentialPool::from_credentials(credentials, PoolConfig::default()).await;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&pool),
        Arc::new(StaticChallenges),
        Arc::new(FlowApi::new(upstream_url.to_string())),
        Arc::new(MediaTracker::new()),
        OrchestratorConfig {
            poll_schedule: PollSchedule {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
                multiplier: 1.5,
                jitter: 0.0,
            },
            overall_timeout: Duration::from_secs(10),
            ..Default::default()
        },
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        catalog: Arc::new(ModelCatalog::default()),
        pool: Arc::clone(&pool),
        orchestrator,
    };

    (build_app_router(state, &config), pool)
}

pub fn standard_credentials(count: u32) -> Vec<Credential> {
    (1..=count)
        .map(|id| {
            Credential::new(
                i64::from(id),
                format!("acct-{id}@example.com"),
                format!("st-{id}"),
                Tier::Standard,
            )
        })
        .collect()
}
