use std::sync::Arc;

use flowgate_core::catalog::ModelCatalog;
use flowgate_pipeline::Orchestrator;
use flowgate_pool::CredentialPool;

use crate::config::ServerConfig;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub catalog: Arc<ModelCatalog>,
    pub pool: Arc<CredentialPool>,
    pub orchestrator: Arc<Orchestrator>,
}
