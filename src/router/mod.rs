//! HTTP surface: an OpenAI-compatible front door over axum, proxying
//! admitted requests to their backend via `reqwest`. Handler shapes are
//! grounded on `other_examples/.../handlers-openai.rs.rs`.

mod admin;
mod auth;
mod openai;
mod proxy;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::models::ModelManager;
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::MetricsStore;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ModelManager>,
    pub metrics: Arc<MetricsStore>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub settings: Arc<Settings>,
    pub http_client: reqwest::Client,
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/v1/chat/completions",
            axum::routing::post(openai::chat_completions),
        )
        .route("/v1/completions", axum::routing::post(openai::completions))
        .route("/v1/embeddings", axum::routing::post(openai::embeddings))
        .route("/v1/models", get(openai::list_models))
        .route("/v1/models/:id", get(openai::get_model))
        .route(
            "/admin/models/:id/load",
            axum::routing::post(admin::load_model),
        )
        .route(
            "/admin/models/:id/unload",
            axum::routing::post(admin::unload_model),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    let public = Router::new()
        .route("/health", get(admin::health))
        .route("/health/live", get(admin::live))
        .route("/health/ready", get(admin::ready))
        .route("/metrics", get(admin::metrics));

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
