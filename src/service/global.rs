//! Project-wide key/value facts.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::locks::{compound_key, KeyedLocks};
use super::validation::{
    canonical_project, new_id, parse_rfc3339, require_project_id, timestamp_now,
    validate_global_key, GLOBAL_KEY_PREFIX,
};
use crate::embedding::EmbedderHandle;
use crate::error::{MemoryError, Result, StoreResultExt};
use crate::memory::{GlobalFact, Store};

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpsertGlobalRequest {
    pub project_id: String,
    /// Must look like `global.<name>`.
    pub key: String,
    /// Any JSON value.
    #[serde(default)]
    pub value: Value,
    /// RFC3339 timestamp; defaults to now.
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetGlobalRequest {
    pub project_id: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertGlobalResponse {
    pub ok: bool,
    pub id: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetGlobalResponse {
    pub namespace: String,
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl GetGlobalResponse {
    fn from_fact(namespace: String, fact: Option<GlobalFact>) -> Self {
        match fact {
            Some(f) => Self {
                namespace,
                found: true,
                id: Some(f.id),
                value: Some(f.value),
                updated_at: Some(f.updated_at),
            },
            None => Self {
                namespace,
                found: false,
                id: None,
                value: None,
                updated_at: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteGlobalResponse {
    pub ok: bool,
    pub id: String,
    pub namespace: String,
}

pub struct GlobalService {
    store: Arc<dyn Store>,
    embedder: Arc<EmbedderHandle>,
    locks: KeyedLocks,
}

impl GlobalService {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<EmbedderHandle>) -> Self {
        Self {
            store,
            embedder,
            locks: KeyedLocks::new(),
        }
    }

    /// Create or overwrite a fact. Re-upserting a key keeps its original id.
    pub async fn upsert_global(&self, req: UpsertGlobalRequest) -> Result<UpsertGlobalResponse> {
        self.upsert_global_with_cancel(req, &CancellationToken::new()).await
    }

    /// [`upsert_global`](Self::upsert_global) with caller cancellation. The
    /// embedding dimension is resolved first, so facts and notes share a
    /// namespace from the first write on.
    pub async fn upsert_global_with_cancel(
        &self,
        req: UpsertGlobalRequest,
        cancel: &CancellationToken,
    ) -> Result<UpsertGlobalResponse> {
        require_project_id(&req.project_id)?;
        validate_global_key(&req.key)?;
        parse_rfc3339("updatedAt", req.updated_at.as_deref())?;

        let project_id = canonical_project(&req.project_id)?;
        let updated_at = match req.updated_at {
            Some(ts) if !ts.is_empty() => ts,
            _ => timestamp_now(),
        };
        let coordinator = self.embedder.current();
        coordinator.ensure_dimension_until(cancel.cancelled()).await?;
        let namespace = coordinator.namespace();
        let lock_key = compound_key(&[namespace.as_str(), project_id.as_str(), req.key.as_str()]);
        let _guard = self.locks.lock(&lock_key).await;

        let fact = GlobalFact {
            id: new_id(),
            project_id,
            key: req.key,
            value: req.value,
            updated_at,
        };
        let stored = self.store.upsert_global(&namespace, &fact).await?;

        tracing::info!(
            id = %stored.id,
            key = %stored.key,
            project = %stored.project_id,
            %namespace,
            "global fact upserted"
        );
        Ok(UpsertGlobalResponse {
            ok: true,
            id: stored.id,
            namespace,
        })
    }

    /// Look up a fact. An empty key is simply not found; any other key must
    /// carry the `global.` prefix.
    pub async fn get_global(&self, req: GetGlobalRequest) -> Result<GetGlobalResponse> {
        require_project_id(&req.project_id)?;
        if !req.key.is_empty() && !req.key.starts_with(GLOBAL_KEY_PREFIX) {
            return Err(MemoryError::InvalidGlobalKey {
                key: req.key,
                reason: "must start with \"global.\"".into(),
            });
        }

        let project_id = canonical_project(&req.project_id)?;
        let namespace = self.embedder.current().namespace();
        if req.key.is_empty() {
            return Ok(GetGlobalResponse::from_fact(namespace, None));
        }
        let fact = self.store.get_global(&namespace, &project_id, &req.key).await?;
        Ok(GetGlobalResponse::from_fact(namespace, fact))
    }

    pub async fn delete_global(&self, id: &str) -> Result<DeleteGlobalResponse> {
        if id.is_empty() {
            return Err(MemoryError::IdRequired);
        }
        let namespace = self.embedder.current().namespace();
        let fact = self
            .store
            .get_global_by_id(&namespace, id)
            .await
            .or_not_found(|| MemoryError::GlobalNotFound(id.to_string()))?;

        // Shares the upsert lock for this key.
        let _guard = self
            .locks
            .lock(&compound_key(&[namespace.as_str(), fact.project_id.as_str(), fact.key.as_str()]))
            .await;
        self.store
            .delete_global(&namespace, id)
            .await
            .or_not_found(|| MemoryError::GlobalNotFound(id.to_string()))?;

        tracing::info!(id, key = %fact.key, %namespace, "global fact deleted");
        Ok(DeleteGlobalResponse {
            ok: true,
            id: id.to_string(),
            namespace,
        })
    }
}
