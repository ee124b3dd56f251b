//! Shared request-forwarding logic: acquire a backend reference, forward the
//! request body verbatim to the backend's matching path, and stream the
//! response back. The acquired `LiveRef` is moved into the response body's
//! stream so the reference count stays held until every chunk has been
//! read — whether that's because the backend finished or because the
//! client disconnected early and axum dropped the body.

use std::time::Instant;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures::TryStreamExt;

use crate::error::AppError;
use crate::telemetry;

use super::AppState;

pub async fn forward(
    state: &AppState,
    model_id: &str,
    path: &str,
    body: Bytes,
) -> Result<Response, AppError> {
    let start = Instant::now();

    // Register this request before doing any admission work so a shutdown
    // that starts mid-request waits for it; reject outright if draining has
    // already begun rather than starting work that can't finish.
    let in_flight = match state.shutdown.track() {
        Some(guard) => guard,
        None => return Err(AppError::Internal("server is shutting down".into())),
    };

    let live_ref = match state.manager.acquire(model_id).await {
        Ok(r) => r,
        Err(e) => {
            telemetry::record_admission_rejection(&state.metrics, model_id);
            return Err(map_manager_error(e));
        }
    };

    let url = format!("http://127.0.0.1:{}{}", live_ref.port, path);
    let upstream = state
        .http_client
        .post(&url)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(resp) => resp,
        Err(e) => {
            telemetry::record_request_failure(&state.metrics, model_id, "upstream_error");
            return Err(AppError::Upstream(e));
        }
    };

    let status = upstream.status();
    let headers = upstream.headers().clone();

    if status.is_success() {
        let latency_ms = start.elapsed().as_millis() as u64;
        telemetry::record_request_success(&state.metrics, model_id, latency_ms);
    } else {
        telemetry::record_request_failure(&state.metrics, model_id, "backend_error_status");
    }

    // `live_ref` and `in_flight` move into this closure and are dropped only
    // once the byte stream itself is dropped, which axum guarantees happens
    // whether the stream is drained to completion or abandoned on client
    // disconnect — so a graceful shutdown drain sees this request as
    // in-flight for its whole lifetime, not just admission.
    let byte_stream = upstream
        .bytes_stream()
        .inspect_ok(move |_| {
            let _ = &live_ref;
            let _ = &in_flight;
        });

    let mut response = Response::new(Body::from_stream(byte_stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

pub(super) fn map_manager_error(err: crate::models::ManagerError) -> AppError {
    use crate::models::ManagerError;
    match err {
        ManagerError::UnknownModel(id) => AppError::UnknownModel(id),
        ManagerError::Planner(e) => AppError::Admission(e),
        ManagerError::Backend(e) => AppError::Backend(e),
        ManagerError::Port(e) => AppError::Internal(e.to_string()),
        ManagerError::Gpu(e) => AppError::Internal(e),
        ManagerError::ConcurrencyLimitExceeded { model_id, limit } => {
            AppError::ConcurrencyLimitExceeded { model_id, limit }
        }
        ManagerError::Busy(id) => AppError::Busy(id),
        ManagerError::StartFailed { model_id, reason } => {
            AppError::Internal(format!("model \"{model_id}\" failed to start: {reason}"))
        }
    }
}
