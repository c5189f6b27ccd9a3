//! Embedding coordinator: dimension learning, timeouts and cancellation.
//!
//! When the configured dimension is `0`, the first successful embedding
//! fixes it. The learned value is recorded exactly once per coordinator and
//! handed to an optional [`DimensionSink`] (in practice, the config manager).
//!
//! A coordinator is also the authority on the namespace for data it embeds:
//! [`namespace`](EmbeddingCoordinator::namespace) is derived from its own
//! provider, model and dimension, never from the live config, so a
//! concurrent reconfiguration cannot split a vector from its partition.

use std::future::Future;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use super::{Embedder, EmbeddingError};
use crate::namespace;

/// Text embedded to discover the dimension before a write that has no text
/// of its own.
const DIMENSION_SAMPLE: &str = "dimension sample";

/// Receives the dimension learned from the first successful embedding.
pub trait DimensionSink: Send + Sync {
    fn record_dimension(&self, dim: usize) -> anyhow::Result<()>;
}

pub struct EmbeddingCoordinator {
    embedder: Arc<dyn Embedder>,
    preset_dim: usize,
    learned_dim: OnceLock<usize>,
    sink: Option<Arc<dyn DimensionSink>>,
    timeout: Option<Duration>,
}

impl EmbeddingCoordinator {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let preset_dim = embedder.dimension();
        Self {
            embedder,
            preset_dim,
            learned_dim: OnceLock::new(),
            sink: None,
            timeout: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DimensionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Bound every embedding call; elapsed calls fail with [`EmbeddingError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn provider(&self) -> &str {
        self.embedder.provider()
    }

    pub fn model(&self) -> &str {
        self.embedder.model()
    }

    /// Preset dimension if configured, else the learned one, else `0`.
    pub fn current_dimension(&self) -> usize {
        if self.preset_dim > 0 {
            self.preset_dim
        } else {
            self.learned_dim.get().copied().unwrap_or(0)
        }
    }

    /// Namespace for vectors produced by this coordinator.
    pub fn namespace(&self) -> String {
        namespace::generate(self.provider(), self.model(), self.current_dimension() as i64)
    }

    /// Make sure the dimension is known, embedding a sample text if it is not.
    ///
    /// Called before writes that carry no vector so they land in the same
    /// `provider:model:dim` namespace as the notes that follow.
    pub async fn ensure_dimension_until<C>(&self, cancel: C) -> Result<usize, EmbeddingError>
    where
        C: Future<Output = ()>,
    {
        if self.current_dimension() == 0 {
            self.embed_until(DIMENSION_SAMPLE, cancel).await?;
        }
        Ok(self.current_dimension())
    }

    /// Embed `text`, learning the dimension on first success.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = self.embedder.embed(text);
        let vector = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| EmbeddingError::Timeout)??,
            None => request.await?,
        };

        if vector.is_empty() {
            return Err(EmbeddingError::EmptyEmbedding);
        }
        if self.preset_dim == 0 {
            self.learn(vector.len());
        }
        Ok(vector)
    }

    /// Like [`embed`](Self::embed), but gives up with
    /// [`EmbeddingError::Cancelled`] as soon as `cancel` resolves.
    pub async fn embed_until<C>(&self, text: &str, cancel: C) -> Result<Vec<f32>, EmbeddingError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => Err(EmbeddingError::Cancelled),
            result = self.embed(text) => result,
        }
    }

    fn learn(&self, dim: usize) {
        self.learned_dim.get_or_init(|| {
            tracing::info!(
                provider = self.provider(),
                model = self.model(),
                dim,
                "learned embedding dimension"
            );
            if let Some(sink) = &self.sink {
                if let Err(e) = sink.record_dimension(dim) {
                    tracing::warn!(error = %e, dim, "failed to record learned embedding dimension");
                }
            }
            dim
        });
    }
}

/// Swappable handle to the active coordinator.
///
/// Operations clone the current `Arc` and keep using it even if a config
/// update swaps in a new coordinator mid-call.
pub struct EmbedderHandle {
    current: RwLock<Arc<EmbeddingCoordinator>>,
}

impl EmbedderHandle {
    pub fn new(coordinator: EmbeddingCoordinator) -> Self {
        Self {
            current: RwLock::new(Arc::new(coordinator)),
        }
    }

    pub fn current(&self) -> Arc<EmbeddingCoordinator> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn replace(&self, coordinator: EmbeddingCoordinator) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(coordinator);
    }
}
