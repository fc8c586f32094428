//! HTTP chat API built on axum.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::index::IndexHandle;
use crate::pipeline::RagPipeline;
use crate::types::ChatMessage;

/// State shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
    pub index: Arc<IndexHandle>,
    pub index_path: PathBuf,
}

impl AppState {
    pub fn new(pipeline: Arc<RagPipeline>, index: Arc<IndexHandle>, index_path: PathBuf) -> Self {
        Self {
            pipeline,
            index,
            index_path,
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatPayload {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Build the router with `/health`, `/api/chat` and `/api/index/reload`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/index/reload", post(reload_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let index = state.index.current();
    Json(serde_json::json!({
        "status": "ok",
        "index_loaded": index.is_some(),
        "documents": index.as_ref().map_or(0, |i| i.len()),
        "dimension": index.as_ref().and_then(|i| i.dimension()),
    }))
}

async fn chat_handler(State(state): State<AppState>, Json(payload): Json<ChatPayload>) -> Response {
    if payload.query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "query must not be empty");
    }
    let answer = state.pipeline.answer(&payload.query, &payload.history).await;
    Json(answer).into_response()
}

async fn reload_handler(State(state): State<AppState>) -> Response {
    let index = Arc::clone(&state.index);
    let path = state.index_path.clone();
    let loaded = tokio::task::spawn_blocking(move || index.load_from(&path)).await;

    match loaded {
        Ok(Ok(index)) => Json(serde_json::json!({ "documents": index.len() })).into_response(),
        Ok(Err(e)) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        Err(e) => {
            error!(error = %e, "Index reload task failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "index reload task failed")
        }
    }
}

/// Serve the API on `addr` until Ctrl-C.
pub async fn run(state: AppState, addr: &str) -> Result<(), std::io::Error> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Chat API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
}
