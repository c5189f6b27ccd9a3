//! Runtime config inspection and embedder switching.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::{AppConfig, ConfigManager, EmbedderConfig, EmbedderPatch};
use crate::embedding::{
    create_embedder, DimensionSink, EmbedderHandle, EmbeddingCoordinator, EmbeddingError,
    OPENAI_API_KEY_ENV,
};
use crate::error::Result;

/// Upper bound on a single embedding call made by the services.
pub const EMBED_TIMEOUT: Duration = Duration::from_secs(60);

/// Records learned dimensions into the config, bound to the provider/model
/// pair the coordinator was built for.
pub struct ConfigDimensionSink {
    manager: Arc<ConfigManager>,
    provider: String,
    model: String,
}

impl ConfigDimensionSink {
    pub fn new(manager: Arc<ConfigManager>, embedder: &EmbedderConfig) -> Self {
        Self {
            manager,
            provider: embedder.provider.clone(),
            model: embedder.model.clone(),
        }
    }
}

impl DimensionSink for ConfigDimensionSink {
    fn record_dimension(&self, dim: usize) -> anyhow::Result<()> {
        let dim = u32::try_from(dim)?;
        if self.manager.learn_dimension(&self.provider, &self.model, dim)? {
            // Called from inside an embedding call; keep file I/O off the task.
            self.manager.persist_in_background();
        }
        Ok(())
    }
}

/// Build a coordinator for `embedder`, wired to record its learned dimension
/// into `manager`.
pub fn build_coordinator(
    embedder: &EmbedderConfig,
    manager: &Arc<ConfigManager>,
) -> std::result::Result<EmbeddingCoordinator, EmbeddingError> {
    let provider = create_embedder(embedder, std::env::var(OPENAI_API_KEY_ENV).ok())?;
    let sink = ConfigDimensionSink::new(Arc::clone(manager), embedder);
    Ok(EmbeddingCoordinator::new(Arc::from(provider))
        .with_sink(Arc::new(sink))
        .with_timeout(EMBED_TIMEOUT))
}

#[derive(Debug, Clone, Serialize)]
pub struct GetConfigResponse {
    #[serde(flatten)]
    pub config: AppConfig,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetConfigResponse {
    pub ok: bool,
    pub effective_namespace: String,
}

pub struct ConfigService {
    config: Arc<ConfigManager>,
    embedder: Arc<EmbedderHandle>,
    update_lock: Mutex<()>,
}

impl ConfigService {
    pub fn new(config: Arc<ConfigManager>, embedder: Arc<EmbedderHandle>) -> Self {
        Self {
            config,
            embedder,
            update_lock: Mutex::new(()),
        }
    }

    /// Current config with the API key masked, plus the active namespace.
    pub fn get_config(&self) -> GetConfigResponse {
        let mut config = self.config.snapshot();
        config.embedder = config.embedder.redacted();
        GetConfigResponse {
            namespace: config.embedder.namespace(),
            config,
        }
    }

    /// Apply an embedder patch and swap in a matching coordinator.
    ///
    /// The new provider is built before anything is committed, so a patch
    /// naming an unknown provider or lacking a key leaves the config untouched.
    pub async fn set_config(&self, patch: EmbedderPatch) -> Result<SetConfigResponse> {
        let _guard = self.update_lock.lock().await;

        if patch == EmbedderPatch::default() {
            return Ok(SetConfigResponse {
                ok: true,
                effective_namespace: self.config.namespace(),
            });
        }

        let next = self.config.preview_embedder(&patch);
        let coordinator = build_coordinator(&next, &self.config)?;
        let namespace = self.config.update_embedder(&patch);
        self.embedder.replace(coordinator);
        // The in-memory update stands even when writing the file fails.
        if let Err(e) = self.config.persist_async().await {
            tracing::warn!(error = %e, "failed to persist embedder config");
        }

        tracing::info!(
            provider = %next.provider,
            model = %next.model,
            %namespace,
            "embedder reconfigured"
        );
        Ok(SetConfigResponse {
            ok: true,
            effective_namespace: namespace,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn learned_dimension_is_written_off_the_caller() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        let mut config = AppConfig::default();
        config.paths.config_path = path.to_string_lossy().into_owned();
        let manager = Arc::new(ConfigManager::persistent(config));

        let sink = ConfigDimensionSink::new(Arc::clone(&manager), &manager.embedder());
        sink.record_dimension(7).unwrap();
        assert_eq!(manager.embedder().dim, 7);

        // The write happens on the blocking pool; wait for it to land.
        let mut written = None;
        for _ in 0..100 {
            if path.exists() {
                written = Some(AppConfig::load_from(&path).unwrap().embedder.dim);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(written, Some(7));

        // A repeat report of the same dimension is not an error.
        sink.record_dimension(7).unwrap();
    }

    #[tokio::test]
    async fn set_config_persists_the_patch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        let mut config = AppConfig::default();
        config.paths.config_path = path.to_string_lossy().into_owned();
        config.embedder.provider = "local".into();
        let manager = Arc::new(ConfigManager::persistent(config));
        let handle = Arc::new(EmbedderHandle::new(
            build_coordinator(&manager.embedder(), &manager).unwrap(),
        ));
        let service = ConfigService::new(Arc::clone(&manager), handle);

        let resp = service
            .set_config(EmbedderPatch {
                model: Some("hash".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(resp.effective_namespace, "local:hash");

        let reloaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.embedder.model, "hash");
    }
}
