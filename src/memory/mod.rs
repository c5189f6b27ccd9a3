//! Namespace-partitioned persistence.
//!
//! [`Store`] is the seam between the services and a backend. Every method
//! takes the active namespace; rows written under one namespace are never
//! returned for another. Two backends ship: [`in_memory::MemoryStore`] and
//! [`sqlite::SqliteStore`].

pub mod in_memory;
pub mod search;
pub mod sqlite;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use types::{GlobalFact, Group, Note, ScoredNote};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("id already exists: {0}")]
    DuplicateId(String),

    #[error("groupKey {group_key:?} already exists in project {project_id}")]
    DuplicateGroupKey {
        project_id: String,
        group_key: String,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("failed to decode stored {field}: {message}")]
    Corrupt { field: &'static str, message: String },

    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Filters for [`Store::search`]. All filters combine with AND.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub project_id: String,
    pub group_id: Option<String>,
    pub top_k: usize,
    /// Notes must carry every tag listed here.
    pub tags: Vec<String>,
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub until: Option<DateTime<Utc>>,
}

/// Filters for [`Store::list_recent`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub project_id: String,
    pub group_id: Option<String>,
    pub limit: usize,
    pub tags: Vec<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new note. Fails with [`StoreError::DuplicateId`] if the id is taken.
    async fn add_note(&self, ns: &str, note: &Note, embedding: &[f32]) -> StoreResult<()>;

    async fn get_note(&self, ns: &str, id: &str) -> StoreResult<Note>;

    /// Replace a note's fields, and its embedding when one is given. The
    /// text and vector change together or not at all.
    async fn update_note(
        &self,
        ns: &str,
        note: &Note,
        embedding: Option<&[f32]>,
    ) -> StoreResult<()>;

    async fn delete_note(&self, ns: &str, id: &str) -> StoreResult<()>;

    /// Rank matching notes by similarity to `query`, best first.
    async fn search(
        &self,
        ns: &str,
        query: &[f32],
        opts: &SearchOptions,
    ) -> StoreResult<Vec<ScoredNote>>;

    /// Newest notes first by `created_at`.
    async fn list_recent(&self, ns: &str, opts: &ListOptions) -> StoreResult<Vec<Note>>;

    async fn add_group(&self, ns: &str, group: &Group) -> StoreResult<()>;

    async fn get_group(&self, ns: &str, id: &str) -> StoreResult<Group>;

    async fn get_group_by_key(
        &self,
        ns: &str,
        project_id: &str,
        group_key: &str,
    ) -> StoreResult<Group>;

    async fn update_group(&self, ns: &str, group: &Group) -> StoreResult<()>;

    async fn delete_group(&self, ns: &str, id: &str) -> StoreResult<()>;

    /// Groups of a project ordered by creation.
    async fn list_groups(&self, ns: &str, project_id: &str) -> StoreResult<Vec<Group>>;

    /// Insert or replace by `(project_id, key)`. An existing fact keeps its id.
    async fn upsert_global(&self, ns: &str, fact: &GlobalFact) -> StoreResult<GlobalFact>;

    async fn get_global(
        &self,
        ns: &str,
        project_id: &str,
        key: &str,
    ) -> StoreResult<Option<GlobalFact>>;

    async fn get_global_by_id(&self, ns: &str, id: &str) -> StoreResult<GlobalFact>;

    async fn delete_global(&self, ns: &str, id: &str) -> StoreResult<()>;
}

/// Encode an embedding as little-endian f32 bytes.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes. Fails if the length is not a multiple of 4.
pub fn bytes_to_embedding(bytes: &[u8]) -> StoreResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(StoreError::Corrupt {
            field: "embedding",
            message: format!("{} bytes is not a whole number of f32 values", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_are_little_endian() {
        let bytes = embedding_to_bytes(&[1.0, -0.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), vec![1.0, -0.5]);
    }

    #[test]
    fn truncated_embedding_is_corrupt() {
        assert!(matches!(
            bytes_to_embedding(&[0, 0, 128]),
            Err(StoreError::Corrupt { field: "embedding", .. })
        ));
    }
}
