//! Note operations: add, search, get, update, delete, list recent.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use super::locks::KeyedLocks;
use super::patch::NotePatch;
use super::validation::{
    canonical_project, new_id, parse_rfc3339, require_project_id, timestamp_now, validate_group_id,
};
use crate::embedding::EmbedderHandle;
use crate::error::{MemoryError, Result, StoreResultExt};
use crate::memory::{ListOptions, Note, ScoredNote, SearchOptions, Store};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_LIST_LIMIT: usize = 10;

// ── Requests ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddNoteRequest {
    /// Project path; `~` is expanded and symlinks are resolved.
    pub project_id: String,
    /// Group the note belongs to (A-Z a-z 0-9 _ -).
    pub group_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// RFC3339 timestamp; defaults to now.
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub project_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    pub query: String,
    /// Maximum results (default 5).
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Only notes carrying all of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Inclusive RFC3339 lower bound on createdAt.
    #[serde(default)]
    pub since: Option<String>,
    /// Inclusive RFC3339 upper bound on createdAt.
    #[serde(default)]
    pub until: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoteRequest {
    pub id: String,
    #[serde(default)]
    pub patch: NotePatch,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListRecentRequest {
    pub project_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    /// Maximum results (default 10, 0 returns nothing).
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddNoteResponse {
    pub id: String,
    pub project_id: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub namespace: String,
    pub results: Vec<ScoredNote>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteResponse {
    #[serde(flatten)]
    pub note: Note,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoteResponse {
    pub ok: bool,
    pub id: String,
    pub re_embedded: bool,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
    pub id: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListRecentResponse {
    pub namespace: String,
    pub items: Vec<Note>,
}

// ── Service ──────────────────────────────────────────────────────────────────

pub struct NoteService {
    store: Arc<dyn Store>,
    embedder: Arc<EmbedderHandle>,
    locks: KeyedLocks,
}

impl NoteService {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<EmbedderHandle>) -> Self {
        Self {
            store,
            embedder,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn add_note(&self, req: AddNoteRequest) -> Result<AddNoteResponse> {
        self.add_note_with_cancel(req, &CancellationToken::new()).await
    }

    /// [`add_note`](Self::add_note), abandoning the embedding call once
    /// `cancel` fires.
    pub async fn add_note_with_cancel(
        &self,
        req: AddNoteRequest,
        cancel: &CancellationToken,
    ) -> Result<AddNoteResponse> {
        // 1. Validate inputs
        require_project_id(&req.project_id)?;
        validate_group_id(&req.group_id)?;
        if req.text.is_empty() {
            return Err(MemoryError::TextRequired);
        }
        parse_rfc3339("createdAt", req.created_at.as_deref())?;

        // 2. Embed; the vector belongs to this coordinator's namespace even if
        // the embedder is swapped meanwhile
        let coordinator = self.embedder.current();
        let embedding = coordinator.embed_until(&req.text, cancel.cancelled()).await?;
        let namespace = coordinator.namespace();

        // 3. Canonicalize and stamp
        let project_id = canonical_project(&req.project_id)?;
        let created_at = match req.created_at {
            Some(ts) if !ts.is_empty() => ts,
            _ => timestamp_now(),
        };

        let note = Note {
            id: new_id(),
            project_id,
            group_id: req.group_id,
            title: req.title,
            text: req.text,
            tags: req.tags,
            source: req.source,
            created_at,
            metadata: req.metadata.unwrap_or_default(),
        };

        // 4. Persist
        self.store.add_note(&namespace, &note, &embedding).await?;

        tracing::info!(
            id = %note.id,
            project = %note.project_id,
            group = %note.group_id,
            %namespace,
            "note added"
        );
        Ok(AddNoteResponse {
            id: note.id,
            project_id: note.project_id,
            namespace,
        })
    }

    pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
        self.search_with_cancel(req, &CancellationToken::new()).await
    }

    pub async fn search_with_cancel(
        &self,
        req: SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        require_project_id(&req.project_id)?;
        if req.query.is_empty() {
            return Err(MemoryError::QueryRequired);
        }
        if let Some(group_id) = &req.group_id {
            validate_group_id(group_id)?;
        }
        let since = parse_rfc3339("since", req.since.as_deref())?;
        let until = parse_rfc3339("until", req.until.as_deref())?;

        let coordinator = self.embedder.current();
        let query = coordinator.embed_until(&req.query, cancel.cancelled()).await?;
        let namespace = coordinator.namespace();
        let project_id = canonical_project(&req.project_id)?;

        let opts = SearchOptions {
            project_id,
            group_id: req.group_id,
            top_k: req.top_k.unwrap_or(DEFAULT_TOP_K),
            tags: req.tags,
            since,
            until,
        };
        let results = self.store.search(&namespace, &query, &opts).await?;

        tracing::debug!(
            %namespace,
            project = %opts.project_id,
            hits = results.len(),
            "search complete"
        );
        Ok(SearchResponse { namespace, results })
    }

    pub async fn get(&self, id: &str) -> Result<NoteResponse> {
        if id.is_empty() {
            return Err(MemoryError::IdRequired);
        }
        let namespace = self.embedder.current().namespace();
        let note = self
            .store
            .get_note(&namespace, id)
            .await
            .or_not_found(|| MemoryError::NoteNotFound(id.to_string()))?;
        Ok(NoteResponse { note, namespace })
    }

    pub async fn update(&self, req: UpdateNoteRequest) -> Result<UpdateNoteResponse> {
        self.update_with_cancel(req, &CancellationToken::new()).await
    }

    pub async fn update_with_cancel(
        &self,
        req: UpdateNoteRequest,
        cancel: &CancellationToken,
    ) -> Result<UpdateNoteResponse> {
        if req.id.is_empty() {
            return Err(MemoryError::IdRequired);
        }
        req.patch.validate()?;

        let _guard = self.locks.lock(&req.id).await;

        // Read, re-embed and write through one coordinator so the note never
        // leaves the namespace it was found in.
        let coordinator = self.embedder.current();
        let namespace = coordinator.namespace();
        let mut note = self
            .store
            .get_note(&namespace, &req.id)
            .await
            .or_not_found(|| MemoryError::NoteNotFound(req.id.clone()))?;

        let re_embed = req.patch.needs_reembed();
        req.patch.apply(&mut note);

        let embedding = if re_embed {
            Some(coordinator.embed_until(&note.text, cancel.cancelled()).await?)
        } else {
            None
        };

        self.store
            .update_note(&namespace, &note, embedding.as_deref())
            .await
            .or_not_found(|| MemoryError::NoteNotFound(note.id.clone()))?;

        tracing::info!(id = %note.id, re_embedded = re_embed, %namespace, "note updated");
        Ok(UpdateNoteResponse {
            ok: true,
            id: note.id,
            re_embedded: re_embed,
            namespace,
        })
    }

    pub async fn delete(&self, id: &str) -> Result<DeleteResponse> {
        if id.is_empty() {
            return Err(MemoryError::IdRequired);
        }
        let _guard = self.locks.lock(id).await;
        let namespace = self.embedder.current().namespace();
        self.store
            .delete_note(&namespace, id)
            .await
            .or_not_found(|| MemoryError::NoteNotFound(id.to_string()))?;

        tracing::info!(id, %namespace, "note deleted");
        Ok(DeleteResponse {
            ok: true,
            id: id.to_string(),
            namespace,
        })
    }

    pub async fn list_recent(&self, req: ListRecentRequest) -> Result<ListRecentResponse> {
        require_project_id(&req.project_id)?;
        if let Some(group_id) = &req.group_id {
            validate_group_id(group_id)?;
        }
        let limit = req.limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let project_id = canonical_project(&req.project_id)?;
        let namespace = self.embedder.current().namespace();
        if limit == 0 {
            return Ok(ListRecentResponse {
                namespace,
                items: Vec::new(),
            });
        }

        let opts = ListOptions {
            project_id,
            group_id: req.group_id,
            limit,
            tags: req.tags,
        };
        let items = self.store.list_recent(&namespace, &opts).await?;
        Ok(ListRecentResponse { namespace, items })
    }
}
