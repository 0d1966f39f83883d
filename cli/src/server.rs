//! HTTP control plane
//!
//! Exposes the webhook receiver, the query endpoint, and the repository
//! listing. The engine pipeline is synchronous; handlers hop onto the
//! blocking pool. An in-process worker thread consumes the queue so a
//! single `serve` invocation is a complete local deployment.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use codeloom_engine::{
    CancelToken, RetrievalOptions, Service, ServiceError, WebhookError, WebhookHeaders,
    WebhookOutcome,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
struct AppState {
    service: Arc<Service>,
    cancel: CancelToken,
}

/// Run the HTTP server plus the in-process queue worker
pub(crate) fn serve(service: Arc<Service>, bind: &str) -> Result<()> {
    let cancel = CancelToken::new();

    let worker = service.worker();
    let worker_cancel = cancel.clone();
    std::thread::Builder::new()
        .name("queue-worker".to_owned())
        .spawn(move || worker.run(&worker_cancel, Duration::from_millis(500)))
        .context("failed to start the queue worker")?;

    let state = AppState { service, cancel };
    let app = Router::new()
        .route("/webhook", post(webhook))
        .route("/query", post(query))
        .route("/repositories", get(repositories))
        .layer(CorsLayer::permissive())
        .with_state(state);

    log::info!("listening on {bind}");
    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        axum::serve(listener, app).await.context("server error")
    })
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(String::from)
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let webhook_headers = WebhookHeaders {
        signature: header(&headers, "x-hub-signature-256"),
        event: header(&headers, "x-github-event"),
        delivery: header(&headers, "x-github-delivery"),
    };

    let receiver = state.service.webhook_receiver();
    let result =
        tokio::task::spawn_blocking(move || receiver.handle(&webhook_headers, &body)).await;

    match result {
        Ok(Ok(WebhookOutcome::Enqueued(job))) => (
            StatusCode::OK,
            Json(json!({ "message": "Ingestion job enqueued.", "repository": job.repository })),
        ),
        Ok(Ok(WebhookOutcome::Duplicate)) => {
            (StatusCode::ACCEPTED, Json(json!({ "message": "Duplicate event, ignoring." })))
        }
        Ok(Ok(WebhookOutcome::Ignored(reason))) => {
            (StatusCode::OK, Json(json!({ "message": format!("Event received: {reason}. No action taken.") })))
        }
        Ok(Err(err @ WebhookError::InvalidSignature)) => {
            (StatusCode::FORBIDDEN, Json(json!({ "error": err.to_string() })))
        }
        Ok(Err(err @ WebhookError::InvalidPayload(_))) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": err.to_string() })))
        }
        Ok(Err(err @ WebhookError::Enqueue(_))) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() })))
        }
        Err(join_err) => {
            log::error!("webhook handler panicked: {join_err}");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal error" })))
        }
    }
}

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: String,
    repositories: Option<Vec<String>>,
    top_k: Option<usize>,
    per_namespace_k: Option<usize>,
    min_score: Option<f32>,
}

async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if request.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Query parameter is required and cannot be empty" })),
        );
    }

    let options =
        RetrievalOptions::clamped(request.top_k, request.per_namespace_k, request.min_score);
    let service = Arc::clone(&state.service);
    let cancel = state.cancel.clone();

    let result = tokio::task::spawn_blocking(move || {
        service.answer(&request.query, request.repositories.as_deref(), options, &cancel)
    })
    .await;

    match result {
        Ok(Ok(content)) => (StatusCode::OK, Json(json!({ "content": content }))),
        Ok(Err(err @ ServiceError::LlmUnconfigured)) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": err.to_string() })))
        }
        Ok(Err(err)) => {
            log::error!("query failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "An error occurred while processing your request" })),
            )
        }
        Err(join_err) => {
            log::error!("query handler panicked: {join_err}");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal error" })))
        }
    }
}

async fn repositories(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let service = Arc::clone(&state.service);
    let result = tokio::task::spawn_blocking(move || service.repositories()).await;

    match result {
        Ok(Ok(repositories)) => (StatusCode::OK, Json(json!(repositories))),
        Ok(Err(err)) => {
            log::error!("repository listing failed: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal error" })))
        }
        Err(join_err) => {
            log::error!("repositories handler panicked: {join_err}");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal error" })))
        }
    }
}
