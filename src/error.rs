//! Service-level error taxonomy.
//!
//! [`MemoryError`] is what every orchestration operation returns. Its
//! [`kind`](MemoryError::kind) groups variants into the categories the
//! transport layer maps onto protocol error codes.

use thiserror::Error;

use crate::config::ConfigError;
use crate::embedding::EmbeddingError;
use crate::memory::StoreError;

pub type Result<T> = std::result::Result<T, MemoryError>;

/// Coarse classification of a [`MemoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input. Caller-fixable, never retried.
    Validation,
    /// Target entity absent.
    NotFound,
    /// Uniqueness violation (duplicate group key, colliding id).
    Conflict,
    /// Embedding provider failure, including timeouts and cancellation.
    Embedding,
    /// Unexpected store or config failure.
    Internal,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    // Validation
    #[error("projectId is required")]
    ProjectIdRequired,

    #[error("invalid projectId {project_id:?}: {reason}")]
    InvalidProjectId { project_id: String, reason: String },

    #[error("groupId is required")]
    GroupIdRequired,

    #[error("groupId {0:?} contains invalid characters (allowed: A-Z a-z 0-9 _ -)")]
    InvalidGroupId(String),

    #[error("text is required")]
    TextRequired,

    #[error("query is required")]
    QueryRequired,

    #[error("id is required")]
    IdRequired,

    #[error("groupKey is required")]
    GroupKeyRequired,

    #[error("invalid groupKey {key:?}: {reason}")]
    InvalidGroupKey { key: String, reason: String },

    #[error("title is required")]
    TitleRequired,

    #[error("invalid global key {key:?}: {reason}")]
    InvalidGlobalKey { key: String, reason: String },

    #[error("invalid {field} {value:?}: expected an RFC3339 timestamp")]
    InvalidTimeFormat { field: &'static str, value: String },

    // Not found
    #[error("note not found: {0}")]
    NoteNotFound(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("global fact not found: {0}")]
    GlobalNotFound(String),

    // Conflict
    #[error("groupKey {group_key:?} already exists in project {project_id}")]
    GroupKeyExists {
        project_id: String,
        group_key: String,
    },

    #[error("id already exists: {0}")]
    DuplicateId(String),

    // Embedding
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    // Internal
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl MemoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProjectIdRequired
            | Self::InvalidProjectId { .. }
            | Self::GroupIdRequired
            | Self::InvalidGroupId(_)
            | Self::TextRequired
            | Self::QueryRequired
            | Self::IdRequired
            | Self::GroupKeyRequired
            | Self::InvalidGroupKey { .. }
            | Self::TitleRequired
            | Self::InvalidGlobalKey { .. }
            | Self::InvalidTimeFormat { .. } => ErrorKind::Validation,
            Self::NoteNotFound(_)
            | Self::GroupNotFound(_)
            | Self::GlobalNotFound(_) => ErrorKind::NotFound,
            Self::GroupKeyExists { .. } | Self::DuplicateId(_) => ErrorKind::Conflict,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::Config(_) | Self::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for MemoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateId(id) => Self::DuplicateId(id),
            StoreError::DuplicateGroupKey {
                project_id,
                group_key,
            } => Self::GroupKeyExists {
                project_id,
                group_key,
            },
            other => Self::Store(other),
        }
    }
}

/// Turn a store `NotFound` into the entity-specific service error.
pub(crate) trait StoreResultExt<T> {
    fn or_not_found(self, not_found: impl FnOnce() -> MemoryError) -> Result<T>;
}

impl<T> StoreResultExt<T> for std::result::Result<T, StoreError> {
    fn or_not_found(self, not_found: impl FnOnce() -> MemoryError) -> Result<T> {
        self.map_err(|err| match err {
            StoreError::NotFound => not_found(),
            other => other.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_service_kinds() {
        let err: MemoryError = StoreError::DuplicateGroupKey {
            project_id: "/p".into(),
            group_key: "k".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = Err::<(), _>(StoreError::NotFound)
            .or_not_found(|| MemoryError::NoteNotFound("n1".into()))
            .unwrap_err();
        assert!(matches!(err, MemoryError::NoteNotFound(ref id) if id == "n1"));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: MemoryError = StoreError::Database("disk I/O error".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn embedding_errors_keep_their_kind() {
        let err: MemoryError = EmbeddingError::ProviderError {
            status: 429,
            message: "rate limited".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Embedding);
        assert!(err.to_string().contains("429"));
    }
}
