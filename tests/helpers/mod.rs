#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use notemem::config::{AppConfig, ConfigManager, EmbedderConfig};
use notemem::embedding::{
    DimensionSink, Embedder, EmbedderHandle, EmbeddingCoordinator, EmbeddingError,
};
use notemem::memory::in_memory::MemoryStore;
use notemem::memory::sqlite::SqliteStore;
use notemem::memory::Store;
use notemem::service::{ConfigDimensionSink, MemoryServices};

/// Embedder returning fixed vectors for known texts and a small
/// deterministic vector otherwise. Counts every call.
pub struct FakeEmbedder {
    dim: usize,
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    /// Vectors of length `dim`, with no preset dimension reported.
    pub fn new(dim: usize) -> Arc<Self> {
        Arc::new(Self {
            dim,
            vectors: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    /// Pin the vector returned for `text`.
    pub fn set(&self, text: &str, vector: Vec<f32>) {
        self.vectors.lock().unwrap().insert(text.to_string(), vector);
    }

    /// Make every following call take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(v) = self.vectors.lock().unwrap().get(text) {
            return Ok(v.clone());
        }
        let mut v = vec![0.0f32; self.dim];
        let seed = text.bytes().fold(0usize, |acc, b| acc.wrapping_add(b as usize));
        v[seed % self.dim] = 1.0;
        Ok(v)
    }

    fn dimension(&self) -> usize {
        0
    }

    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        "m"
    }
}

/// Sink that forwards to the config manager and counts reports.
pub struct CountingSink {
    inner: ConfigDimensionSink,
    reports: Mutex<Vec<usize>>,
}

impl CountingSink {
    pub fn reports(&self) -> Vec<usize> {
        self.reports.lock().unwrap().clone()
    }
}

impl DimensionSink for CountingSink {
    fn record_dimension(&self, dim: usize) -> anyhow::Result<()> {
        self.reports.lock().unwrap().push(dim);
        self.inner.record_dimension(dim)
    }
}

/// Services over a fake embedder, with the config manager and sink exposed.
pub struct Harness {
    pub services: MemoryServices,
    pub config: Arc<ConfigManager>,
    pub embedder: Arc<FakeEmbedder>,
    pub sink: Arc<CountingSink>,
    pub store: Arc<dyn Store>,
}

/// Config for provider `openai`, model `m`, no dimension yet.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.embedder = EmbedderConfig {
        provider: "openai".into(),
        model: "m".into(),
        dim: 0,
        base_url: None,
        api_key: Some("sk-test".into()),
    };
    config.store.store_type = "memory".into();
    config
}

pub fn harness_with_store(store: Arc<dyn Store>, dim: usize) -> Harness {
    let config = Arc::new(ConfigManager::in_memory(test_config()));
    let embedder = FakeEmbedder::new(dim);
    let sink = Arc::new(CountingSink {
        inner: ConfigDimensionSink::new(Arc::clone(&config), &config.embedder()),
        reports: Mutex::new(Vec::new()),
    });
    let coordinator = EmbeddingCoordinator::new(embedder.clone() as Arc<dyn Embedder>)
        .with_sink(sink.clone() as Arc<dyn DimensionSink>);
    let handle = Arc::new(EmbedderHandle::new(coordinator));
    let services = MemoryServices::new(Arc::clone(&config), Arc::clone(&store), handle);
    Harness {
        services,
        config,
        embedder,
        sink,
        store,
    }
}

/// In-memory store, 3-dimensional fake embedder.
pub fn harness() -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()), 3)
}

pub fn sqlite_harness() -> Harness {
    harness_with_store(Arc::new(SqliteStore::open_in_memory().unwrap()), 3)
}

/// Both store backends, labelled for assertion messages.
pub fn backends() -> Vec<(&'static str, Arc<dyn Store>)> {
    vec![
        ("memory", Arc::new(MemoryStore::new()) as Arc<dyn Store>),
        ("sqlite", Arc::new(SqliteStore::open_in_memory().unwrap()) as Arc<dyn Store>),
    ]
}
