//! Namespace-scoped note memory for AI assistants, served over MCP.
//!
//! notemem persists short text notes, note groups and project-wide key/value
//! facts, embeds notes into vector space and answers nearest-neighbour
//! queries filtered by project, group, tags and time window.
//!
//! Every record lives in a **namespace** derived from the active embedder
//! configuration (`provider:model[:dim]`). Switching provider or model moves
//! reads and writes to a fresh namespace, so vectors from different models
//! never mix.
//!
//! # Architecture
//!
//! - **Storage**: in-memory or SQLite, behind the [`memory::Store`] trait
//! - **Embeddings**: OpenAI-compatible HTTP, Ollama-compatible HTTP, or a
//!   deterministic local hashing embedder; the dimension is learned from
//!   the first successful embedding
//! - **Search**: cosine similarity over filtered candidates
//! - **Transport**: MCP over stdio (primary) or streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: TOML config, env overrides and the runtime [`config::ConfigManager`]
//! - [`namespace`]: namespace string generation and parsing
//! - [`db`]: SQLite initialization, schema and migrations
//! - [`embedding`]: providers and the [`embedding::EmbeddingCoordinator`]
//! - [`memory`]: records and the two store backends
//! - [`service`]: validation and orchestration for notes, groups, globals and config
//! - [`tools`]: the MCP tool surface

pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod namespace;
pub mod server;
pub mod service;
pub mod tools;
