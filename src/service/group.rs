//! Group operations: create, get, update, delete, list.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::locks::{compound_key, KeyedLocks};
use super::patch::GroupPatch;
use super::validation::{canonical_project, new_id, timestamp_now, validate_group_key};
use crate::embedding::EmbedderHandle;
use crate::error::{MemoryError, Result, StoreResultExt};
use crate::memory::{Group, Store, StoreError};

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub project_id: String,
    /// Unique per project (A-Z a-z 0-9 _ -, "global" is reserved).
    pub group_key: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    pub id: String,
    #[serde(default)]
    pub patch: GroupPatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGroupResponse {
    pub id: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupResponse {
    #[serde(flatten)]
    pub group: Group,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupOkResponse {
    pub ok: bool,
    pub id: String,
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListGroupsResponse {
    pub namespace: String,
    pub groups: Vec<Group>,
}

pub struct GroupService {
    store: Arc<dyn Store>,
    embedder: Arc<EmbedderHandle>,
    locks: KeyedLocks,
}

impl GroupService {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<EmbedderHandle>) -> Self {
        Self {
            store,
            embedder,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn create_group(&self, req: CreateGroupRequest) -> Result<CreateGroupResponse> {
        self.create_group_with_cancel(req, &CancellationToken::new()).await
    }

    /// Create a group. The embedding dimension is resolved first so the
    /// group shares a namespace with the notes written after it.
    pub async fn create_group_with_cancel(
        &self,
        req: CreateGroupRequest,
        cancel: &CancellationToken,
    ) -> Result<CreateGroupResponse> {
        if req.project_id.is_empty() {
            return Err(MemoryError::ProjectIdRequired);
        }
        validate_group_key(&req.group_key)?;
        if req.title.is_empty() {
            return Err(MemoryError::TitleRequired);
        }

        let project_id = canonical_project(&req.project_id)?;
        let coordinator = self.embedder.current();
        coordinator.ensure_dimension_until(cancel.cancelled()).await?;
        let namespace = coordinator.namespace();
        let lock_key =
            compound_key(&[namespace.as_str(), project_id.as_str(), req.group_key.as_str()]);
        let _guard = self.locks.lock(&lock_key).await;

        match self.store.get_group_by_key(&namespace, &project_id, &req.group_key).await {
            Ok(_) => {
                return Err(MemoryError::GroupKeyExists {
                    project_id,
                    group_key: req.group_key,
                })
            }
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let now = timestamp_now();
        let group = Group {
            id: new_id(),
            project_id,
            group_key: req.group_key,
            title: req.title,
            description: req.description,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.add_group(&namespace, &group).await?;

        tracing::info!(
            id = %group.id,
            key = %group.group_key,
            project = %group.project_id,
            %namespace,
            "group created"
        );
        Ok(CreateGroupResponse {
            id: group.id,
            namespace,
        })
    }

    pub async fn get_group(&self, id: &str) -> Result<GroupResponse> {
        if id.is_empty() {
            return Err(MemoryError::IdRequired);
        }
        let namespace = self.embedder.current().namespace();
        let group = self
            .store
            .get_group(&namespace, id)
            .await
            .or_not_found(|| MemoryError::GroupNotFound(id.to_string()))?;
        Ok(GroupResponse { group, namespace })
    }

    pub async fn update_group(&self, req: UpdateGroupRequest) -> Result<GroupOkResponse> {
        if req.id.is_empty() {
            return Err(MemoryError::IdRequired);
        }
        req.patch.validate()?;

        let _guard = self.locks.lock(&req.id).await;
        let namespace = self.embedder.current().namespace();
        let mut group = self
            .store
            .get_group(&namespace, &req.id)
            .await
            .or_not_found(|| MemoryError::GroupNotFound(req.id.clone()))?;

        req.patch.apply(&mut group);
        group.updated_at = timestamp_now();

        self.store
            .update_group(&namespace, &group)
            .await
            .or_not_found(|| MemoryError::GroupNotFound(group.id.clone()))?;

        tracing::info!(id = %group.id, %namespace, "group updated");
        Ok(GroupOkResponse {
            ok: true,
            id: group.id,
            namespace,
        })
    }

    /// Delete a group. Notes that reference its key are left in place.
    pub async fn delete_group(&self, id: &str) -> Result<GroupOkResponse> {
        if id.is_empty() {
            return Err(MemoryError::IdRequired);
        }
        let _guard = self.locks.lock(id).await;
        let namespace = self.embedder.current().namespace();
        self.store
            .delete_group(&namespace, id)
            .await
            .or_not_found(|| MemoryError::GroupNotFound(id.to_string()))?;

        tracing::info!(id, %namespace, "group deleted");
        Ok(GroupOkResponse {
            ok: true,
            id: id.to_string(),
            namespace,
        })
    }

    pub async fn list_groups(&self, project_id: &str) -> Result<ListGroupsResponse> {
        let project_id = canonical_project(project_id)?;
        let namespace = self.embedder.current().namespace();
        let groups = self.store.list_groups(&namespace, &project_id).await?;
        Ok(ListGroupsResponse { namespace, groups })
    }
}
