//! Remote providers against a local axum server standing in for the APIs.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use notemem::config::EmbedderConfig;
use notemem::embedding::ollama::OllamaEmbedder;
use notemem::embedding::openai::OpenAiEmbedder;
use notemem::embedding::{create_embedder, Embedder, EmbeddingError};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Seen {
    auth: Arc<Mutex<Option<String>>>,
    body: Arc<Mutex<Option<Value>>>,
}

/// Serve `router` on an ephemeral port and return its base URL.
async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn openai_ok(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    *seen.auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    *seen.body.lock().unwrap() = Some(body);
    Json(json!({
        "object": "list",
        "data": [{"object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3]}],
        "model": "text-embedding-3-small"
    }))
}

#[tokio::test]
async fn openai_posts_model_and_bearer_key() {
    let seen = Seen::default();
    let base = spawn(
        Router::new()
            .route("/v1/embeddings", post(openai_ok))
            .with_state(seen.clone()),
    )
    .await;

    let base_url = format!("{base}/v1/");
    let embedder =
        OpenAiEmbedder::new("text-embedding-3-small", "sk-test".into(), Some(base_url.as_str()), 0)
            .unwrap();
    let v = embedder.embed("hello").await.unwrap();
    assert_eq!(v, vec![0.1, 0.2, 0.3]);
    assert_eq!(embedder.dimension(), 0);

    assert_eq!(seen.auth.lock().unwrap().as_deref(), Some("Bearer sk-test"));
    let body = seen.body.lock().unwrap().clone().unwrap();
    assert_eq!(body["model"], "text-embedding-3-small");
    assert_eq!(body["input"], json!(["hello"]));
}

#[tokio::test]
async fn openai_error_status_is_provider_error() {
    let base = spawn(Router::new().route(
        "/embeddings",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
    ))
    .await;

    let embedder = OpenAiEmbedder::new("m", "k".into(), Some(base.as_str()), 0).unwrap();
    match embedder.embed("x").await.unwrap_err() {
        err @ EmbeddingError::ProviderError { status: 429, .. } => {
            assert!(err.is_retryable());
            assert!(err.to_string().contains("slow down"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn openai_empty_data_is_empty_embedding() {
    let base = spawn(Router::new().route(
        "/embeddings",
        post(|| async { Json(json!({"data": []})) }),
    ))
    .await;

    let embedder = OpenAiEmbedder::new("m", "k".into(), Some(base.as_str()), 0).unwrap();
    assert!(matches!(embedder.embed("x").await, Err(EmbeddingError::EmptyEmbedding)));
}

#[tokio::test]
async fn openai_garbage_body_is_invalid_response() {
    let base = spawn(Router::new().route("/embeddings", post(|| async { "not json" }))).await;

    let embedder = OpenAiEmbedder::new("m", "k".into(), Some(base.as_str()), 0).unwrap();
    let err = embedder.embed("x").await.unwrap_err();
    assert!(matches!(err, EmbeddingError::InvalidResponse(_)), "{err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn ollama_reads_embeddings_and_legacy_field() {
    let base = spawn(Router::new().route(
        "/api/embed",
        post(|Json(body): Json<Value>| async move {
            if body["model"] == "legacy" {
                Json(json!({"embedding": [1.0, 2.0]}))
            } else {
                Json(json!({"model": body["model"], "embeddings": [[0.5, 0.25, 0.125, 0.0]]}))
            }
        }),
    ))
    .await;

    let current = OllamaEmbedder::new("nomic-embed-text", Some(base.as_str()), 0).unwrap();
    assert_eq!(current.embed("hi").await.unwrap(), vec![0.5, 0.25, 0.125, 0.0]);

    let legacy = OllamaEmbedder::new("legacy", Some(base.as_str()), 2).unwrap();
    assert_eq!(legacy.embed("hi").await.unwrap(), vec![1.0, 2.0]);
    assert_eq!(legacy.dimension(), 2);
}

#[tokio::test]
async fn unreachable_server_is_retryable() {
    // Bind then drop to get a port nothing listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let embedder = OllamaEmbedder::new("m", Some(format!("http://{addr}").as_str()), 0).unwrap();
    let err = embedder.embed("x").await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Unavailable(_)), "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn factory_selects_provider_and_resolves_key() {
    let config = |provider: &str, api_key: Option<&str>| EmbedderConfig {
        provider: provider.into(),
        model: "m".into(),
        dim: 0,
        base_url: None,
        api_key: api_key.map(String::from),
    };

    let e = create_embedder(&config("openai", Some("sk-config")), None).unwrap();
    assert_eq!(e.provider(), "openai");
    assert!(create_embedder(&config("openai", None), Some("sk-env".into())).is_ok());
    assert!(matches!(
        create_embedder(&config("openai", None), None),
        Err(EmbeddingError::ApiKeyRequired(_))
    ));
    assert!(matches!(
        create_embedder(&config("openai", Some("")), Some(String::new())),
        Err(EmbeddingError::ApiKeyRequired(_))
    ));

    assert_eq!(create_embedder(&config("ollama", None), None).unwrap().provider(), "ollama");
    assert_eq!(create_embedder(&config("local", None), None).unwrap().provider(), "local");
    assert!(matches!(
        create_embedder(&config("qdrant", None), None),
        Err(EmbeddingError::UnknownProvider(p)) if p == "qdrant"
    ));
}
