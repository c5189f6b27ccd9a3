use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tracing::info;

use crate::namespace;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub transport_defaults: TransportDefaults,
    pub embedder: EmbedderConfig,
    pub store: StoreConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TransportDefaults {
    /// `"stdio"` or `"http"`.
    pub default_transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EmbedderConfig {
    /// `"openai"`, `"ollama"` or `"local"`.
    pub provider: String,
    pub model: String,
    /// Vector dimension. `0` until learned from the first embedding.
    pub dim: u32,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// `"sqlite"` or `"memory"`.
    #[serde(rename = "type")]
    pub store_type: String,
    pub path: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub config_path: String,
    pub data_dir: String,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            default_transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8765,
            log_level: "info".into(),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            dim: 0,
            base_url: None,
            api_key: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: "sqlite".into(),
            path: None,
            url: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path().to_string_lossy().into_owned(),
            data_dir: default_notemem_dir()
                .join("data")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl EmbedderConfig {
    /// The namespace this embedder configuration writes into.
    pub fn namespace(&self) -> String {
        namespace::generate(&self.provider, &self.model, i64::from(self.dim))
    }

    /// Apply a partial update. A provider or model change resets `dim` to 0 so
    /// the dimension is learned again, even for a pair seen before.
    pub fn apply(&mut self, patch: &EmbedderPatch) {
        let mut reset_dim = false;
        if let Some(provider) = &patch.provider {
            reset_dim |= *provider != self.provider;
            self.provider = provider.clone();
        }
        if let Some(model) = &patch.model {
            reset_dim |= *model != self.model;
            self.model = model.clone();
        }
        if let Some(base_url) = &patch.base_url {
            self.base_url = Some(base_url.clone());
        }
        if let Some(api_key) = &patch.api_key {
            self.api_key = Some(api_key.clone());
        }
        if reset_dim {
            self.dim = 0;
        }
    }

    /// Copy with the API key masked, for display.
    pub fn redacted(&self) -> Self {
        Self {
            api_key: self.api_key.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }
}

/// Partial embedder update accepted by [`ConfigManager::update_embedder`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmbedderPatch {
    /// `"openai"`, `"ollama"` or `"local"`. Changing it resets the dimension.
    #[serde(default)]
    pub provider: Option<String>,
    /// Changing the model resets the dimension.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Returns `~/.notemem/`
pub fn default_notemem_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".notemem")
}

/// Returns the default config file path: `~/.notemem/config.toml`
pub fn default_config_path() -> PathBuf {
    default_notemem_dir().join("config.toml")
}

impl AppConfig {
    /// Load config from `NOTEMEM_CONFIG` or the default path, then apply env var overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("NOTEMEM_CONFIG")
            .map(|p| expand_tilde(&p))
            .unwrap_or_else(|_| default_config_path());
        Self::load_from(path)
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AppConfig::default()
        };
        config.paths.config_path = path.to_string_lossy().into_owned();

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (NOTEMEM_DB, NOTEMEM_STORE, NOTEMEM_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NOTEMEM_DB") {
            self.store.path = Some(val);
        }
        if let Ok(val) = std::env::var("NOTEMEM_STORE") {
            self.store.store_type = val;
        }
        if let Ok(val) = std::env::var("NOTEMEM_LOG_LEVEL") {
            self.transport_defaults.log_level = val;
        }
    }

    /// Resolve the SQLite database path: `store.path` if set, else `<data_dir>/memory.db`.
    pub fn resolved_db_path(&self) -> PathBuf {
        match self.store.path.as_deref() {
            Some(path) if !path.is_empty() => expand_tilde(path),
            _ => expand_tilde(&self.paths.data_dir).join("memory.db"),
        }
    }
}

/// Expand a leading `~` or `~/`. Other forms (`~user`) are returned unchanged.
pub fn expand_tilde(path: &str) -> PathBuf {
    let home = match dirs::home_dir() {
        Some(home) => home,
        None => return PathBuf::from(path),
    };
    if path == "~" {
        home
    } else if let Some(rest) = path.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Canonicalize a project id: expand `~`, make absolute, resolve symlinks.
///
/// If symlink resolution fails (e.g. the path does not exist) the absolute
/// path is used instead.
pub fn canonicalize_project_id(project_id: &str) -> std::io::Result<String> {
    let expanded = expand_tilde(project_id);
    let absolute = std::path::absolute(&expanded)?;
    let canonical = std::fs::canonicalize(&absolute).unwrap_or(absolute);
    Ok(canonical.to_string_lossy().into_owned())
}

/// Errors raised by [`ConfigManager`] mutations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("dimension report for {provider}:{model} is stale; embedder is now {current}")]
    StaleDimension {
        provider: String,
        model: String,
        current: String,
    },

    #[error("dimension already pinned to {current}, refusing {reported}")]
    DimensionConflict { current: u32, reported: u32 },

    #[error("failed to persist config: {0}")]
    Persist(#[from] anyhow::Error),
}

/// Lock-guarded owner of the live configuration.
///
/// All embedder mutations go through [`update_embedder`](Self::update_embedder)
/// and [`learn_dimension`](Self::learn_dimension); readers take snapshots.
/// Mutations only touch memory. Writing the file back is a separate step
/// ([`persist`](Self::persist) and its async variants) so callers on the
/// runtime can keep blocking I/O off their tasks.
#[derive(Debug)]
pub struct ConfigManager {
    config: RwLock<AppConfig>,
    persist: bool,
    save_lock: Mutex<()>,
}

impl ConfigManager {
    /// A manager that writes every persisted mutation back to `paths.config_path`.
    pub fn persistent(config: AppConfig) -> Self {
        Self {
            config: RwLock::new(config),
            persist: true,
            save_lock: Mutex::new(()),
        }
    }

    /// A manager that keeps mutations in memory only.
    pub fn in_memory(config: AppConfig) -> Self {
        Self {
            config: RwLock::new(config),
            persist: false,
            save_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> AppConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn embedder(&self) -> EmbedderConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .embedder
            .clone()
    }

    /// The namespace the live config describes.
    pub fn namespace(&self) -> String {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .embedder
            .namespace()
    }

    /// What the embedder config would look like after `patch`, without committing it.
    pub fn preview_embedder(&self, patch: &EmbedderPatch) -> EmbedderConfig {
        let mut embedder = self.embedder();
        embedder.apply(patch);
        embedder
    }

    /// Apply a partial embedder update and return the new effective namespace.
    pub fn update_embedder(&self, patch: &EmbedderPatch) -> String {
        let namespace = {
            let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
            config.embedder.apply(patch);
            config.embedder.namespace()
        };
        info!(namespace = %namespace, "embedder config updated");
        namespace
    }

    /// Record a learned dimension for `provider:model`. Returns `true` when
    /// the dimension was newly pinned.
    ///
    /// Rejected when the active embedder has since moved to another
    /// provider/model, or when a different dimension is already pinned.
    pub fn learn_dimension(
        &self,
        provider: &str,
        model: &str,
        dim: u32,
    ) -> Result<bool, ConfigError> {
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        let embedder = &mut config.embedder;
        if embedder.provider != provider || embedder.model != model {
            return Err(ConfigError::StaleDimension {
                provider: provider.to_string(),
                model: model.to_string(),
                current: embedder.namespace(),
            });
        }
        if embedder.dim == dim {
            return Ok(false);
        }
        if embedder.dim != 0 {
            return Err(ConfigError::DimensionConflict {
                current: embedder.dim,
                reported: dim,
            });
        }
        embedder.dim = dim;
        info!(provider, model, dim, "embedding dimension learned");
        Ok(true)
    }

    /// Write the current config to disk if this manager is persistent. Blocking.
    pub fn persist(&self) -> Result<(), ConfigError> {
        if self.persist {
            let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.save()?;
        }
        Ok(())
    }

    /// [`persist`](Self::persist) on the blocking pool.
    pub async fn persist_async(self: &Arc<Self>) -> Result<(), ConfigError> {
        if !self.persist {
            return Ok(());
        }
        let manager = Arc::clone(self);
        tokio::task::spawn_blocking(move || manager.persist())
            .await
            .map_err(|e| ConfigError::Persist(anyhow::anyhow!("config writer panicked: {e}")))?
    }

    /// Fire-and-forget [`persist`](Self::persist) for synchronous callers.
    /// Runs on the blocking pool when a runtime is available, inline otherwise.
    pub fn persist_in_background(self: &Arc<Self>) {
        if !self.persist {
            return;
        }
        let manager = Arc::clone(self);
        let write = move || {
            if let Err(e) = manager.persist() {
                tracing::warn!(error = %e, "failed to persist config");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }

    /// Write the config as TOML via a temp file and rename.
    pub fn save(&self) -> Result<()> {
        let config = self.snapshot();
        let path = expand_tilde(&config.paths.config_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(&config).context("failed to serialize config")?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path).context("failed to rename temp config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.transport_defaults.default_transport, "stdio");
        assert_eq!(config.transport_defaults.log_level, "info");
        assert_eq!(config.embedder.provider, "openai");
        assert_eq!(config.embedder.dim, 0);
        assert_eq!(config.store.store_type, "sqlite");
        assert!(config.paths.config_path.ends_with("config.toml"));
        assert!(config.resolved_db_path().ends_with("memory.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[transport_defaults]
log_level = "debug"

[embedder]
provider = "ollama"
model = "nomic-embed-text"
dim = 768

[store]
type = "memory"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.transport_defaults.log_level, "debug");
        assert_eq!(config.embedder.provider, "ollama");
        assert_eq!(config.embedder.namespace(), "ollama:nomic-embed-text:768");
        assert_eq!(config.store.store_type, "memory");
        // defaults still apply for unset fields
        assert_eq!(config.transport_defaults.default_transport, "stdio");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        std::env::set_var("NOTEMEM_DB", "/tmp/override.db");
        std::env::set_var("NOTEMEM_STORE", "memory");
        std::env::set_var("NOTEMEM_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.store.path.as_deref(), Some("/tmp/override.db"));
        assert_eq!(config.store.store_type, "memory");
        assert_eq!(config.transport_defaults.log_level, "trace");
        assert_eq!(config.resolved_db_path(), PathBuf::from("/tmp/override.db"));

        // Clean up
        std::env::remove_var("NOTEMEM_DB");
        std::env::remove_var("NOTEMEM_STORE");
        std::env::remove_var("NOTEMEM_LOG_LEVEL");
    }

    #[test]
    fn provider_change_resets_dimension() {
        let mut config = AppConfig::default();
        config.embedder.dim = 1536;
        let manager = ConfigManager::in_memory(config);

        let ns = manager
            .update_embedder(&EmbedderPatch {
                provider: Some("ollama".into()),
                ..Default::default()
            });
        assert_eq!(ns, "ollama:text-embedding-3-small");
        assert_eq!(manager.embedder().dim, 0);
    }

    #[test]
    fn same_model_keeps_dimension_other_fields_too() {
        let mut config = AppConfig::default();
        config.embedder.dim = 1536;
        let manager = ConfigManager::in_memory(config);

        let ns = manager
            .update_embedder(&EmbedderPatch {
                model: Some("text-embedding-3-small".into()),
                base_url: Some("http://proxy.local/v1".into()),
                ..Default::default()
            });
        assert_eq!(ns, "openai:text-embedding-3-small:1536");
        assert_eq!(
            manager.embedder().base_url.as_deref(),
            Some("http://proxy.local/v1")
        );
    }

    #[test]
    fn learn_dimension_pins_and_rejects_stale_reports() {
        let manager = ConfigManager::in_memory(AppConfig::default());
        assert!(manager
            .learn_dimension("openai", "text-embedding-3-small", 3)
            .unwrap());
        assert_eq!(manager.namespace(), "openai:text-embedding-3-small:3");
        assert!(!manager
            .learn_dimension("openai", "text-embedding-3-small", 3)
            .unwrap());

        assert!(matches!(
            manager.learn_dimension("openai", "text-embedding-3-small", 4),
            Err(ConfigError::DimensionConflict { current: 3, reported: 4 })
        ));
        assert!(matches!(
            manager.learn_dimension("ollama", "other", 8),
            Err(ConfigError::StaleDimension { .. })
        ));
    }

    #[test]
    fn save_round_trips_through_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        let mut config = AppConfig::default();
        config.paths.config_path = path.to_string_lossy().into_owned();
        let manager = ConfigManager::persistent(config);

        manager.learn_dimension("openai", "text-embedding-3-small", 12).unwrap();
        manager.persist().unwrap();
        let reloaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.embedder.dim, 12);
    }

    #[test]
    fn redacted_masks_api_key() {
        let config = EmbedderConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        assert_eq!(config.redacted().api_key.as_deref(), Some("********"));
    }

    #[test]
    fn canonicalize_falls_back_to_absolute_path() {
        let id = canonicalize_project_id("/definitely/not/a/real/path").unwrap();
        assert_eq!(id, "/definitely/not/a/real/path");
    }

    #[test]
    fn canonicalize_resolves_existing_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        let expected = std::fs::canonicalize(tmp.path()).unwrap();
        let id = canonicalize_project_id(&tmp.path().to_string_lossy()).unwrap();
        assert_eq!(PathBuf::from(id), expected);
    }

    #[test]
    fn tilde_expansion() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~"), home);
        assert_eq!(expand_tilde("~/proj"), home.join("proj"));
        assert_eq!(expand_tilde("~other/proj"), PathBuf::from("~other/proj"));
    }
}
