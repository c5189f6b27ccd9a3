//! Orchestration services.
//!
//! Each operation validates input, embeds when needed, canonicalizes the
//! project id, stamps ids and timestamps and then calls the store. The
//! namespace comes from the embedding coordinator the operation started
//! with, so a concurrent reconfiguration never splits a vector from its
//! partition. Writes without text of their own resolve the embedding
//! dimension first. Responses carry the namespace used.
//!
//! Operations that may call the embedder have a `*_with_cancel` variant
//! taking a [`CancellationToken`](tokio_util::sync::CancellationToken).

pub mod config;
pub mod global;
pub mod group;
pub mod locks;
pub mod note;
pub mod patch;
pub mod validation;

use std::sync::Arc;

use crate::config::ConfigManager;
use crate::embedding::EmbedderHandle;
use crate::memory::Store;

pub use config::{build_coordinator, ConfigDimensionSink, ConfigService};
pub use global::GlobalService;
pub use group::GroupService;
pub use note::NoteService;
pub use patch::{GroupPatch, NotePatch, Patch};

/// All services sharing one store, embedder handle and config.
pub struct MemoryServices {
    pub notes: NoteService,
    pub groups: GroupService,
    pub globals: GlobalService,
    pub config: ConfigService,
}

impl MemoryServices {
    pub fn new(
        config: Arc<ConfigManager>,
        store: Arc<dyn Store>,
        embedder: Arc<EmbedderHandle>,
    ) -> Self {
        Self {
            notes: NoteService::new(Arc::clone(&store), Arc::clone(&embedder)),
            groups: GroupService::new(Arc::clone(&store), Arc::clone(&embedder)),
            globals: GlobalService::new(store, Arc::clone(&embedder)),
            config: ConfigService::new(config, embedder),
        }
    }
}
