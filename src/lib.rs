//! modelgate — a dynamic inference-model proxy.
//!
//! Exposes an OpenAI-compatible HTTP surface over a shared GPU: backends are
//! spawned on demand, admitted against live GPU memory, idle-reaped, and
//! evicted to make room, all behind reference-counted request routing.

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod gpu;
pub mod models;
pub mod ports;
pub mod router;
pub mod shutdown;
pub mod telemetry;

use std::sync::Arc;

use config::Settings;
use models::{ModelManager, ModelRegistry};
use shutdown::ShutdownCoordinator;
use telemetry::MetricsStore;

/// Everything `main` needs to build and run the HTTP server: the wired
/// manager, metrics store, and shutdown coordinator, plus the settings they
/// were built from.
pub struct Runtime {
    pub settings: Arc<Settings>,
    pub manager: Arc<ModelManager>,
    pub metrics: Arc<MetricsStore>,
    pub shutdown: Arc<ShutdownCoordinator>,
}

impl Runtime {
    pub fn new(settings: Settings) -> Self {
        let registry = Arc::new(ModelRegistry::from_settings(&settings));
        let gpu = gpu::build_oracle(&settings.gpu);
        let settings = Arc::new(settings);
        let manager = Arc::new(ModelManager::new(
            registry,
            gpu,
            (*settings).clone(),
        ));
        let metrics = Arc::new(MetricsStore::new());
        let shutdown = ShutdownCoordinator::new();

        Self {
            settings,
            manager,
            metrics,
            shutdown,
        }
    }

    /// Build the axum application ready to be served.
    pub fn build_router(&self) -> axum::Router {
        let state = router::AppState {
            manager: self.manager.clone(),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
            settings: self.settings.clone(),
            http_client: reqwest::Client::new(),
        };
        router::build_router(state)
    }
}
