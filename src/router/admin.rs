//! Ambient admin routes: liveness/readiness, the Prometheus exporter, and
//! the load/unload admin endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::telemetry::{self, encode_prometheus};

use super::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let models = state.manager.registry().snapshot_for_metrics().await;
    let running = models.iter().filter(|m| m.running).count();
    let gpu = state.manager.gpu_snapshot().ok().map(|s| {
        json!({
            "total_mb": s.total_mb,
            "used_mb": s.used_mb,
            "free_mb": s.free_mb,
        })
    });
    let model_status: Vec<_> = models
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "running": m.running,
                "active_requests": m.active_requests,
            })
        })
        .collect();
    Json(json!({
        "status": "ok",
        "draining": state.shutdown.is_draining(),
        "models_running": running,
        "models_declared": models.len(),
        "models": model_status,
        "gpu": gpu,
    }))
}

/// Process-responsive check: if this handler runs at all, the process is
/// alive. Never reflects admission or backend state.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "alive" })))
}

/// Admission-subsystem check: the GPU oracle must be reachable and the
/// process must not already be draining for graceful shutdown.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.shutdown.is_draining() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "draining" })),
        );
    }
    match state.manager.gpu_snapshot() {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": e.to_string() })),
        ),
    }
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if let Ok(snapshot) = state.manager.gpu_snapshot() {
        telemetry::record_gpu_free_mb(&state.metrics, snapshot.free_mb);
    }
    let body = encode_prometheus(&state.metrics.snapshot());
    (
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

#[derive(Debug, Deserialize, Default)]
pub struct UnloadParams {
    #[serde(default)]
    pub force: bool,
}

pub async fn load_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state
        .manager
        .preload(&id)
        .await
        .map_err(super::proxy::map_manager_error)?;
    Ok(Json(json!({ "id": id, "status": "loaded" })))
}

pub async fn unload_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<UnloadParams>,
) -> Result<impl IntoResponse, AppError> {
    state
        .manager
        .unload(&id, params.force)
        .await
        .map_err(super::proxy::map_manager_error)?;
    Ok(Json(json!({ "id": id, "status": "unloaded" })))
}
