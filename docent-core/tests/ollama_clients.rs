//! Ollama embedding and chat clients against an in-process stub server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use docent_core::config::{EmbeddingConfig, LlmConfig};
use docent_core::{
    AnswerGenerator, ChatBackend, ChatMessage, ChatRequest, DEGRADED_ANSWER, EmbeddingError,
    EmbeddingProvider, LlmError, OllamaChatClient, OllamaEmbedder,
};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Stub {
    seen: Arc<Mutex<Vec<Value>>>,
}

async fn embed_handler(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.seen.lock().unwrap().push(body.clone());
    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    let embeddings: Vec<Vec<f32>> = inputs
        .iter()
        .enumerate()
        .map(|(i, _)| vec![i as f32, 1.0, 0.5])
        .collect();
    Json(json!({ "model": body["model"], "embeddings": embeddings }))
}

async fn short_embed_handler(Json(_body): Json<Value>) -> Json<Value> {
    Json(json!({ "embeddings": [[1.0, 2.0]] }))
}

async fn chat_handler(State(stub): State<Stub>, Json(body): Json<Value>) -> Json<Value> {
    stub.seen.lock().unwrap().push(body);
    Json(json!({
        "model": "qwen3:4b",
        "message": { "role": "assistant", "content": "<think>checking</think>It works." },
        "done": true
    }))
}

async fn slow_chat_handler(Json(_body): Json<Value>) -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({ "message": { "role": "assistant", "content": "too late" } }))
}

async fn failing_handler() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded")
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn embedding_config(base_url: String) -> EmbeddingConfig {
    EmbeddingConfig {
        base_url,
        model: "multilingual-e5-small".into(),
        query_prefix: "query: ".into(),
        document_prefix: "passage: ".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_embed_documents_applies_prefix() {
    let stub = Stub::default();
    let base = spawn(
        Router::new()
            .route("/api/embed", post(embed_handler))
            .with_state(stub.clone()),
    )
    .await;
    let embedder = OllamaEmbedder::new(&embedding_config(base)).unwrap();

    let vectors = embedder
        .embed_documents(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![0.0, 1.0, 0.5], vec![1.0, 1.0, 0.5]]);

    let query = embedder.embed_query("question").await.unwrap();
    assert_eq!(query.len(), 3);

    let seen = stub.seen.lock().unwrap().clone();
    assert_eq!(seen[0]["model"], "multilingual-e5-small");
    assert_eq!(seen[0]["input"], json!(["passage: first", "passage: second"]));
    assert_eq!(seen[1]["input"], json!(["query: question"]));
}

#[tokio::test]
async fn test_embed_count_mismatch_detected() {
    let base = spawn(Router::new().route("/api/embed", post(short_embed_handler))).await;
    let embedder = OllamaEmbedder::new(&embedding_config(base)).unwrap();
    let err = embedder
        .embed_documents(&["a".to_string(), "b".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EmbeddingError::CountMismatch {
            expected: 2,
            actual: 1
        }
    ));
}

#[tokio::test]
async fn test_embed_status_error() {
    let base = spawn(Router::new().route("/api/embed", post(failing_handler))).await;
    let embedder = OllamaEmbedder::new(&embedding_config(base)).unwrap();
    match embedder.embed_query("q").await.unwrap_err() {
        EmbeddingError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "model not loaded");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_chat_client_sends_non_streaming_request() {
    let stub = Stub::default();
    let base = spawn(
        Router::new()
            .route("/api/chat", post(chat_handler))
            .with_state(stub.clone()),
    )
    .await;
    let config = LlmConfig {
        base_url: base,
        ..Default::default()
    };
    let client = OllamaChatClient::new(&config).unwrap();
    let raw = client
        .chat(ChatRequest::new(&config, vec![ChatMessage::user("ping")]))
        .await
        .unwrap();
    assert_eq!(raw, "<think>checking</think>It works.");

    let seen = stub.seen.lock().unwrap().clone();
    assert_eq!(seen[0]["stream"], false);
    assert_eq!(seen[0]["model"], "qwen3:4b");
    assert_eq!(seen[0]["messages"][0], json!({"role": "user", "content": "ping"}));
    assert_eq!(seen[0]["options"]["num_ctx"], 4096);
}

#[tokio::test]
async fn test_generator_strips_reasoning_from_live_reply() {
    let base = spawn(
        Router::new()
            .route("/api/chat", post(chat_handler))
            .with_state(Stub::default()),
    )
    .await;
    let config = LlmConfig {
        base_url: base,
        ..Default::default()
    };
    let generator = AnswerGenerator::new(
        Arc::new(OllamaChatClient::new(&config).unwrap()),
        config,
    );
    let answer = generator
        .generate("Does it work?", &["It works.".to_string()], &[])
        .await;
    assert_eq!(answer, "It works.");
}

#[tokio::test]
async fn test_chat_status_error() {
    let base = spawn(Router::new().route("/api/chat", post(failing_handler))).await;
    let config = LlmConfig {
        base_url: base,
        ..Default::default()
    };
    let client = OllamaChatClient::new(&config).unwrap();
    let err = client
        .chat(ChatRequest::new(&config, vec![ChatMessage::user("x")]))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_slow_backend_yields_degraded_answer() {
    let base = spawn(Router::new().route("/api/chat", post(slow_chat_handler))).await;
    let config = LlmConfig {
        base_url: base,
        ..Default::default()
    };
    let generator = AnswerGenerator::new(
        Arc::new(OllamaChatClient::new(&config).unwrap()),
        config,
    )
    .with_timeout(Duration::from_millis(100));
    assert_eq!(generator.generate("q", &[], &[]).await, DEGRADED_ANSWER);
}

#[tokio::test]
async fn test_unreachable_backend_yields_degraded_answer() {
    let config = LlmConfig {
        base_url: "http://127.0.0.1:9".into(),
        ..Default::default()
    };
    let generator = AnswerGenerator::new(
        Arc::new(OllamaChatClient::new(&config).unwrap()),
        config,
    )
    .with_timeout(Duration::from_secs(5));
    assert_eq!(generator.generate("q", &[], &[]).await, DEGRADED_ANSWER);
}
