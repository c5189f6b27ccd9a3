//! Ollama `/api/embed` provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{http_client, provider_error, Embedder, EmbeddingError};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

// Cold model loads on a local Ollama can take a while.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dim: usize,
}

impl OllamaEmbedder {
    pub fn new(model: &str, base_url: Option<&str>, dim: usize) -> Result<Self, EmbeddingError> {
        let base_url = base_url
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: http_client(REQUEST_TIMEOUT)?,
            base_url,
            model: model.to_string(),
            dim,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// `/api/embed` returns `embeddings`; some server versions still answer with
/// the singular `embedding` field.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    embedding: Vec<f32>,
}

impl EmbedResponse {
    fn into_vector(self) -> Vec<f32> {
        match self.embeddings.into_iter().next() {
            Some(first) if !first.is_empty() => first,
            _ => self.embedding,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let body = response.text().await?;
        let parsed: EmbedResponse =
            serde_json::from_str(&body)
                .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        let embedding = parsed.into_vector();
        if embedding.is_empty() {
            return Err(EmbeddingError::EmptyEmbedding);
        }

        tracing::debug!(model = %self.model, dims = embedding.len(), "ollama embedding received");
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
