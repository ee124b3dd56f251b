//! HTTP surface tests that don't require a live backend process: auth,
//! OpenAI-compatible model listing, request validation, and health/metrics.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use modelgate::config::{ModelSettings, Settings};
use modelgate::gpu::NoGpuOracle;
use modelgate::models::{ModelManager, ModelRegistry};
use modelgate::router::{build_router, AppState};
use modelgate::shutdown::ShutdownCoordinator;
use modelgate::telemetry::MetricsStore;

fn test_state(bearer_token: &str) -> AppState {
    let mut settings = Settings::default();
    settings.proxy.bearer_token = bearer_token.to_string();
    settings.models.insert(
        "echo".into(),
        ModelSettings {
            backend_path: "/bin/true".into(),
            label: Some("Echo Model".into()),
            ..Default::default()
        },
    );

    let registry = Arc::new(ModelRegistry::from_settings(&settings));
    let settings = Arc::new(settings);
    let manager = Arc::new(ModelManager::new(
        registry,
        Box::new(NoGpuOracle),
        (*settings).clone(),
    ));

    AppState {
        manager,
        metrics: Arc::new(MetricsStore::new()),
        shutdown: ShutdownCoordinator::new(),
        settings,
        http_client: reqwest::Client::new(),
    }
}

#[tokio::test]
async fn health_endpoint_reports_declared_and_running_counts() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["models_declared"], 1);
    assert_eq!(json["models_running"], 0);
    assert_eq!(json["draining"], false);
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn models_listing_includes_declared_models() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"][0]["id"], "echo");
    assert_eq!(json["data"][0]["label"], "Echo Model");
}

#[tokio::test]
async fn unknown_model_lookup_is_404() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/models/does-not-exist")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn protected_routes_reject_missing_bearer_token() {
    let app = build_router(test_state("secret-token"));
    let response = app
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_accept_a_matching_bearer_token() {
    let app = build_router(test_state("secret-token"));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/models")
                .header(header::AUTHORIZATION, "Bearer secret-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn public_routes_are_reachable_without_a_token_even_when_one_is_configured() {
    let app = build_router(test_state("secret-token"));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_completions_without_a_model_field_is_a_bad_request() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"messages": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn liveness_probe_is_always_ok() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readiness_probe_is_ok_when_not_draining() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn readiness_probe_fails_once_draining() {
    let state = test_state("");
    state.shutdown.initiate(std::time::Duration::from_millis(10)).await;
    let app = build_router(state);
    let response = app
        .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn admin_unload_of_a_never_loaded_model_is_idempotent() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/models/echo/unload")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_load_of_an_unknown_model_is_a_404() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/models/nope/load")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn requests_are_rejected_once_the_server_is_draining() {
    let state = test_state("");
    state.shutdown.initiate(std::time::Duration::from_millis(10)).await;
    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"model": "echo", "messages": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn chat_completions_for_an_unknown_model_is_a_404() {
    let app = build_router(test_state(""));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"model": "nope", "messages": []}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
