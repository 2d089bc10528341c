//! SQLSage HTTP REST API
//!
//! Axum server exposing the same operations as the Unix socket, on 127.0.0.1:8787 by
//! default. Each endpoint is a thin handler over an inner function that tests can call
//! without going through axum dispatch.
//!
//! Endpoints:
//! - GET  /health         service status
//! - GET  /version        server and protocol version
//! - POST /connect        create a session from a connection string
//! - POST /ask            answer a question within a session
//! - GET  /sessions/:id   session metadata

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use sqlsage_core::ipc::{SqlsageRequest, SqlsageResponse, PROTOCOL_VERSION};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/connect", post(connect_handler))
        .route("/ask", post(ask_handler))
        .route("/sessions/:id", get(session_handler))
        .with_state(state)
}

/// Serve until the broadcast shutdown signal fires.
pub async fn start_http_server(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("SQLSage HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub session_id: Option<Uuid>,
    pub question: Option<String>,
    #[serde(default)]
    pub describe: bool,
}

fn error_body(msg: impl Into<String>) -> serde_json::Value {
    serde_json::json!({
        "error": msg.into(),
        "status": "error",
    })
}

// ============================================================================
// Inner functions
// ============================================================================

pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let mut body = crate::router::health(state).await;
    if let Some(obj) = body.as_object_mut() {
        obj.insert("socket".to_string(), serde_json::json!(state.config.service.socket_path));
    }
    (StatusCode::OK, body)
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
    })
}

pub async fn connect_inner(state: &AppState, req: ConnectRequest) -> (StatusCode, serde_json::Value) {
    let uri = match req.uri {
        Some(u) if !u.trim().is_empty() => u,
        _ => return (StatusCode::BAD_REQUEST, error_body("uri field is required")),
    };

    let response = crate::router::handle_request(SqlsageRequest::Connect { uri }, state).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::BAD_GATEWAY, error_body(e)),
    }
}

pub async fn ask_inner(state: &AppState, req: AskRequest) -> (StatusCode, serde_json::Value) {
    let question = match req.question {
        Some(q) if !q.trim().is_empty() => q,
        _ => return (StatusCode::BAD_REQUEST, error_body("question field is required")),
    };

    let request = SqlsageRequest::Ask {
        session_id: req.session_id,
        question,
        describe: req.describe,
    };
    match response_to_http(crate::router::handle_request(request, state).await) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

pub async fn session_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(SqlsageRequest::Session { session_id: id }, state).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::NOT_FOUND, error_body(e)),
    }
}

// ============================================================================
// Axum handlers
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn connect_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectRequest>,
) -> impl IntoResponse {
    let (status, body) = connect_inner(&state, req).await;
    (status, Json(body))
}

pub async fn ask_handler(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> impl IntoResponse {
    let (status, body) = ask_inner(&state, req).await;
    (status, Json(body))
}

pub async fn session_handler(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let (status, body) = session_inner(&state, id).await;
    (status, Json(body))
}

/// Unwrap an IPC envelope into its data, or its error message.
pub fn response_to_http(response: SqlsageResponse) -> std::result::Result<serde_json::Value, String> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}
