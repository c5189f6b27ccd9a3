//! Text-to-vector embedding pipeline.
//!
//! Provides the async [`Embedder`] trait, the provider implementations
//! (`openai`, `ollama`, `local`), the [`create_embedder`] factory, and the
//! [`EmbeddingCoordinator`] that wraps a provider with dimension learning,
//! timeouts and cancellation.

pub mod coordinator;
pub mod local;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EmbedderConfig;

pub use coordinator::{DimensionSink, EmbedderHandle, EmbeddingCoordinator};

/// Environment variable consulted when the config carries no OpenAI key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Failures surfaced by embedding providers and the coordinator.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider returned an empty vector")]
    EmptyEmbedding,

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding provider returned HTTP {status}: {message}")]
    ProviderError { status: u16, message: String },

    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("embedding request timed out")]
    Timeout,

    #[error("embedding request cancelled")]
    Cancelled,

    #[error("an API key is required for provider {0:?} (set it in config or {OPENAI_API_KEY_ENV})")]
    ApiKeyRequired(String),

    #[error("unknown embedding provider {0:?} (supported: openai, ollama, local)")]
    UnknownProvider(String),
}

impl EmbeddingError {
    /// Whether a caller may reasonably retry the same request with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout | Self::Cancelled => true,
            Self::ProviderError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

/// A remote or local text embedding model.
///
/// Implementations are stateless with respect to dimension: they report a
/// preset via [`dimension`](Self::dimension) (`0` when unknown) and leave
/// learning to the [`EmbeddingCoordinator`].
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text into a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Configured output dimension, or `0` if it must be learned.
    fn dimension(&self) -> usize;

    fn provider(&self) -> &str;

    fn model(&self) -> &str;
}

/// Build a provider from config.
///
/// The API key resolves as explicit config value, then `env_api_key`, then
/// fails with [`EmbeddingError::ApiKeyRequired`] for providers that need one.
pub fn create_embedder(
    config: &EmbedderConfig,
    env_api_key: Option<String>,
) -> Result<Box<dyn Embedder>, EmbeddingError> {
    let dim = config.dim as usize;
    match config.provider.as_str() {
        "openai" => {
            let api_key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .or(env_api_key.filter(|k| !k.is_empty()))
                .ok_or_else(|| EmbeddingError::ApiKeyRequired(config.provider.clone()))?;
            let embedder =
                openai::OpenAiEmbedder::new(
                    &config.model,
                    api_key,
                    config.base_url.as_deref(),
                    dim,
                )?;
            Ok(Box::new(embedder))
        }
        "ollama" => {
            let embedder =
                ollama::OllamaEmbedder::new(&config.model, config.base_url.as_deref(), dim)?;
            Ok(Box::new(embedder))
        }
        "local" => Ok(Box::new(local::LocalEmbedder::new(&config.model, dim))),
        other => Err(EmbeddingError::UnknownProvider(other.to_string())),
    }
}

/// Shared HTTP client settings for the remote providers.
pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, EmbeddingError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EmbeddingError::Unavailable(format!("failed to build HTTP client: {e}")))
}

/// Read a non-success response body into a [`EmbeddingError::ProviderError`].
pub(crate) async fn provider_error(response: reqwest::Response) -> EmbeddingError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    EmbeddingError::ProviderError { status, message }
}
