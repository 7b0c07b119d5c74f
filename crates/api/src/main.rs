use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowgate_api::config::{CaptchaBackend, ServerConfig};
use flowgate_api::router::build_app_router;
use flowgate_api::state::AppState;
use flowgate_captcha::browser::{BrowserConfig, BrowserProvider};
use flowgate_captcha::remote::{RemoteSolverConfig, RemoteSolverProvider};
use flowgate_captcha::ChallengeProvider;
use flowgate_core::catalog::ModelCatalog;
use flowgate_core::media::MediaTracker;
use flowgate_pipeline::{Orchestrator, OrchestratorConfig};
use flowgate_pool::{store, CredentialPool, PoolConfig};
use flowgate_upstream::FlowApi;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "flowgate_api=debug,flowgate_pipeline=debug,flowgate_pool=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    if config.api_key.is_none() {
        tracing::warn!("API_KEY is not set; the /v1 routes are unauthenticated");
    }

    // --- Model catalog ---
    let catalog = match &config.model_catalog_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("Failed to read model catalog '{path}': {e}"));
            ModelCatalog::from_json(&raw)
                .unwrap_or_else(|e| panic!("Failed to parse model catalog '{path}': {e}"))
        }
        None => ModelCatalog::default(),
    };
    tracing::info!(models = catalog.len(), "Model catalog loaded");

    // --- Credential pool ---
    let credentials = store::load_credentials(&config.credentials_file)
        .unwrap_or_else(|e| panic!("Failed to load '{}': {e}", config.credentials_file));
    tracing::info!(count = credentials.len(), "Credentials loaded");

    let pool = CredentialPool::from_credentials(
        credentials,
        PoolConfig {
            exclusive: config.exclusive_pool,
            ..Default::default()
        },
    )
    .await;

    // --- Challenge provider ---
    let challenge = build_challenge_provider(&config);

    // --- Orchestrator ---
    let upstream = Arc::new(FlowApi::new(config.upstream_url.clone()));
    let tracker = Arc::new(MediaTracker::new());
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&pool),
        challenge,
        upstream,
        tracker,
        OrchestratorConfig {
            overall_timeout: Duration::from_secs(config.generation_timeout_secs),
            unknown_reference_policy: config.unknown_reference_policy,
            ..Default::default()
        },
    ));
    tracing::info!("Orchestrator ready");

    // --- App state & router ---
    let state = AppState {
        config: Arc::new(config.clone()),
        catalog: Arc::new(catalog),
        pool,
        orchestrator,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Instantiate the configured challenge provider backend.
fn build_challenge_provider(config: &ServerConfig) -> Arc<dyn ChallengeProvider> {
    match &config.captcha {
        CaptchaBackend::Browser {
            devtools_url,
            challenge_url,
            site_key,
        } => {
            tracing::info!(devtools_url = %devtools_url, "Using browser challenge provider");
            Arc::new(BrowserProvider::new(BrowserConfig::new(
                devtools_url.clone(),
                challenge_url.clone(),
                site_key.clone(),
            )))
        }
        CaptchaBackend::Remote {
            api_url,
            client_key,
            site_key,
            page_url,
        } => {
            tracing::info!(api_url = %api_url, "Using remote challenge provider");
            Arc::new(RemoteSolverProvider::new(RemoteSolverConfig::new(
                api_url.clone(),
                client_key.clone(),
                site_key.clone(),
                page_url.clone(),
            )))
        }
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
