//! OpenAI-compatible handlers. Grounded on the axum handler shapes in
//! `other_examples/.../handlers-openai.rs.rs` — list endpoint builds the
//! response envelope locally, completion endpoints delegate straight to the
//! proxy layer.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use serde_json::{json, Value};

use crate::error::AppError;

use super::{proxy, AppState};

fn extract_model_id(body: &Bytes) -> Result<String, AppError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::InvalidRequest(format!("invalid JSON body: {e}")))?;
    value
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::InvalidRequest("request body missing \"model\" field".into()))
}

pub async fn chat_completions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let model_id = extract_model_id(&body)?;
    proxy::forward(&state, &model_id, "/v1/chat/completions", body).await
}

pub async fn completions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let model_id = extract_model_id(&body)?;
    proxy::forward(&state, &model_id, "/v1/completions", body).await
}

pub async fn embeddings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let model_id = extract_model_id(&body)?;
    proxy::forward(&state, &model_id, "/v1/embeddings", body).await
}

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let entries = state.manager.registry().list_for_api().await;
    let data: Vec<Value> = entries
        .into_iter()
        .map(|entry| {
            json!({
                "id": entry.id,
                "object": "model",
                "created": 0,
                "owned_by": "modelgate",
                "label": entry.label,
                "tags": entry.tags,
                "status": entry.status,
                "port": entry.port,
                "active_requests": entry.active_requests,
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data }))
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let entry = state
        .manager
        .registry()
        .detail_for_api(&id)
        .await
        .ok_or_else(|| AppError::UnknownModel(id.clone()))?;
    Ok(Json(json!({
        "id": entry.id,
        "object": "model",
        "created": 0,
        "owned_by": "modelgate",
        "label": entry.label,
        "tags": entry.tags,
        "status": entry.status,
        "port": entry.port,
        "active_requests": entry.active_requests,
        "idle_seconds": entry.idle_seconds,
        "last_used_at_ms": entry.last_used_at_ms,
    })))
}
