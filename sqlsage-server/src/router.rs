use std::time::Instant;

use sqlsage_core::ipc::{SqlsageRequest, SqlsageResponse};
use sqlsage_core::models::QueryResponse;
use uuid::Uuid;

use crate::state::AppState;
use crate::subsystems::{connect, execute::PgExecutor};

pub async fn handle_request(request: SqlsageRequest, state: &AppState) -> SqlsageResponse {
    match request {
        SqlsageRequest::Ping => SqlsageResponse::pong(),
        SqlsageRequest::Health => SqlsageResponse::ok(health(state).await),
        SqlsageRequest::Connect { uri } => handle_connect(&uri, state).await,
        SqlsageRequest::Ask {
            session_id,
            question,
            describe,
        } => handle_ask(session_id, &question, describe, state).await,
        SqlsageRequest::Session { session_id } => match state.sessions.get(&session_id).await {
            Some(session) => match serde_json::to_value(&session) {
                Ok(data) => SqlsageResponse::ok(data),
                Err(e) => SqlsageResponse::err(e.to_string()),
            },
            None => SqlsageResponse::err(format!("Unknown session: {}", session_id)),
        },
    }
}

pub async fn health(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.len().await,
        "embedding_backend": state.pipeline.embedder().name(),
        "storage_root": state.pipeline.storage().root().display().to_string(),
    })
}

async fn handle_connect(uri: &str, state: &AppState) -> SqlsageResponse {
    let start = Instant::now();
    let result = connect::create_session(
        uri,
        &state.config.catalog,
        state.pipeline.storage(),
        state.pipeline.embedder(),
    )
    .await;

    match result {
        Ok(session) => {
            let data = serde_json::json!({
                "session_id": session.id,
                "tables": session.table_count,
                "foreign_keys": session.foreign_key_count,
                "connection_time": start.elapsed().as_secs_f64(),
            });
            state.sessions.insert(session).await;
            SqlsageResponse::ok(data)
        }
        Err(e) => SqlsageResponse::err(e.to_string()),
    }
}

async fn handle_ask(session_id: Option<Uuid>, question: &str, describe: bool, state: &AppState) -> SqlsageResponse {
    if question.trim().is_empty() {
        return SqlsageResponse::err("question cannot be empty");
    }

    let session = match session_id {
        Some(id) => state.sessions.get(&id).await,
        None => None,
    };

    // Registry lock is released here; the turn below awaits freely.
    let response = match session {
        None => QueryResponse::not_connected(),
        Some(session) => {
            let start = Instant::now();
            let executor = PgExecutor::new(session.connection_uri.clone());
            let response = state.pipeline.answer(&session, question, &executor, describe).await;
            let elapsed = start.elapsed().as_secs_f64();
            tracing::info!(
                session_id = %session.id,
                kind = response.kind(),
                processing_time = elapsed,
                "Turn complete"
            );
            response.with_processing_time(elapsed)
        }
    };

    match serde_json::to_value(&response) {
        Ok(data) => SqlsageResponse::ok(data),
        Err(e) => SqlsageResponse::err(format!("Failed to serialize response: {}", e)),
    }
}
