use std::sync::Arc;

use ledgergate_ai::Classifier;
use ledgergate_infra::{Engine, EngineConfig, EngineResult};

use crate::app::errors::ApiError;

/// Engine shared by every handler.
pub struct AppServices {
    engine: Engine,
}

impl AppServices {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run an engine call on the blocking pool. Ledger appends may wait on a per-key lock.
    pub async fn run<T, F>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Engine) -> EngineResult<T> + Send + 'static,
    {
        let services = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&services.engine))
            .await
            .map_err(|e| ApiError::Internal(format!("engine task failed: {e}")))?
            .map_err(ApiError::from)
    }
}

/// Engine from config, with the classifier the config names.
pub fn build_services(config: EngineConfig) -> EngineResult<AppServices> {
    Ok(AppServices::new(Engine::from_config(config)?))
}

/// Engine with an explicit classifier (tests, embedding).
pub fn build_services_with(config: EngineConfig, classifier: Arc<dyn Classifier>) -> EngineResult<AppServices> {
    Ok(AppServices::new(Engine::in_memory(config, classifier)?))
}
