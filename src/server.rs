//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! [`build_services`] wires the config manager, store backend and embedding
//! coordinator into [`MemoryServices`]; [`serve_stdio`] and [`serve_http`]
//! put the tool handler on a transport.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rmcp::ServiceExt;

use crate::config::{AppConfig, ConfigManager};
use crate::embedding::EmbedderHandle;
use crate::memory::in_memory::MemoryStore;
use crate::memory::sqlite::SqliteStore;
use crate::memory::Store;
use crate::service::{build_coordinator, MemoryServices};
use crate::tools::MemoryTools;

/// Open the configured store backend.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    match config.store.store_type.as_str() {
        "sqlite" => {
            let db_path = config.resolved_db_path();
            let store = SqliteStore::open(&db_path)?;
            tracing::info!(db = %db_path.display(), "sqlite store ready");
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::info!("in-memory store ready (data is lost on exit)");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => bail!("unsupported store type {other:?} (supported: sqlite, memory)"),
    }
}

/// Shared setup: config manager, store, embedder, services.
pub fn build_services(config: AppConfig) -> Result<Arc<MemoryServices>> {
    let store = open_store(&config)?;
    let manager = Arc::new(ConfigManager::persistent(config));

    let embedder_config = manager.embedder();
    let coordinator = build_coordinator(&embedder_config, &manager)
        .context("failed to create embedding provider")?;
    tracing::info!(
        provider = %embedder_config.provider,
        model = %embedder_config.model,
        namespace = %manager.namespace(),
        "embedding provider ready"
    );

    let embedder = Arc::new(EmbedderHandle::new(coordinator));
    Ok(Arc::new(MemoryServices::new(manager, store, embedder)))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: AppConfig) -> Result<()> {
    tracing::info!("starting notemem MCP server on stdio");

    let services = build_services(config)?;
    let tools = MemoryTools::new(services);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over streamable HTTP transport.
pub async fn serve_http(config: AppConfig) -> Result<()> {
    let host = config.transport_defaults.host.clone();
    let port = config.transport_defaults.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting notemem MCP server on HTTP");

    let services = build_services(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(MemoryTools::new(Arc::clone(&services))),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
