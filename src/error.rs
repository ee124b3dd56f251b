//! Top-level error type for the proxy, with the HTTP status mapping baked in.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::models::PlannerError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("unknown model \"{0}\"")]
    UnknownModel(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error(transparent)]
    Admission(#[from] PlannerError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("model \"{model_id}\" has reached its concurrency limit of {limit}")]
    ConcurrencyLimitExceeded { model_id: String, limit: u32 },

    #[error("model \"{0}\" is busy and cannot be unloaded without force")]
    Busy(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            AppError::UnknownModel(_) => (StatusCode::NOT_FOUND, "model_not_found"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Admission(PlannerError::Infeasible { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "capacity_exhausted")
            }
            AppError::Admission(_) => (StatusCode::INTERNAL_SERVER_ERROR, "admission_error"),
            AppError::Backend(_) => (StatusCode::BAD_GATEWAY, "backend_unavailable"),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::ConcurrencyLimitExceeded { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "concurrency_limit_exceeded")
            }
            AppError::Busy(_) => (StatusCode::CONFLICT, "model_busy"),
        };

        let mut body = json!({
            "error": {
                "message": self.to_string(),
                "type": kind,
            }
        });

        if let AppError::Admission(PlannerError::Infeasible { shortfall }) = &self {
            body["error"]["shortfall"] = json!({
                "required_mb": shortfall.required_mb,
                "free_mb": shortfall.free_mb,
                "considered": shortfall.considered,
            });
        }

        if let AppError::ConcurrencyLimitExceeded { limit, .. } = &self {
            body["error"]["limit"] = json!(limit);
        }

        (status, Json(body)).into_response()
    }
}
