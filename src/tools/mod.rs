//! MCP tool surface.
//!
//! Each tool deserializes its arguments straight into a service request,
//! calls the service, and returns the response as JSON text. Service errors
//! become MCP errors according to their [`ErrorKind`]. Tools that embed pass
//! the request's cancellation token down, so a client cancelling the call
//! abandons the provider request.

pub mod params;

use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content};
use rmcp::{tool, tool_handler, tool_router, ErrorData, ServerHandler};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::embedding::EmbeddingError;
use crate::error::{ErrorKind, MemoryError};
use crate::service::global::{GetGlobalRequest, UpsertGlobalRequest};
use crate::service::group::{CreateGroupRequest, UpdateGroupRequest};
use crate::service::note::{AddNoteRequest, ListRecentRequest, SearchRequest, UpdateNoteRequest};
use crate::service::MemoryServices;
use params::{GetConfigParams, IdParams, ProjectParams, SetConfigParams};

/// The MCP tool handler. Holds the shared services and exposes every
/// operation via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct MemoryTools {
    tool_router: ToolRouter<Self>,
    services: Arc<MemoryServices>,
}

/// Map a service error onto an MCP error, keeping the message.
pub fn to_mcp_error(err: MemoryError) -> ErrorData {
    let message = err.to_string();
    match err.kind() {
        ErrorKind::Validation => ErrorData::invalid_params(message, None),
        ErrorKind::NotFound => ErrorData::resource_not_found(message, None),
        ErrorKind::Conflict => ErrorData::invalid_request(message, None),
        ErrorKind::Embedding => {
            let data = match &err {
                MemoryError::Embedding(e) => {
                    let status = match e {
                        EmbeddingError::ProviderError { status, .. } => Some(*status),
                        _ => None,
                    };
                    serde_json::json!({ "retryable": e.is_retryable(), "status": status })
                }
                _ => serde_json::Value::Null,
            };
            ErrorData::internal_error(message, Some(data))
        }
        ErrorKind::Internal => ErrorData::internal_error(message, None),
    }
}

fn respond<T: Serialize>(result: Result<T, MemoryError>) -> Result<CallToolResult, ErrorData> {
    let value = result.map_err(|e| {
        tracing::warn!(error = %e, "tool call failed");
        to_mcp_error(e)
    })?;
    let json = serde_json::to_string(&value)
        .map_err(|e| ErrorData::internal_error(format!("serialization failed: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[tool_router]
impl MemoryTools {
    pub fn new(services: Arc<MemoryServices>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            services,
        }
    }

    #[tool(description = "Store a note in a project group. The text is embedded for later semantic search.")]
    async fn memory_add_note(
        &self,
        Parameters(req): Parameters<AddNoteRequest>,
        ct: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(
            project = %req.project_id,
            group = %req.group_id,
            text_len = req.text.len(),
            "memory_add_note called"
        );
        respond(self.services.notes.add_note_with_cancel(req, &ct).await)
    }

    #[tool(description = "Semantic search over a project's notes, optionally filtered by group, tags (all must match) and an inclusive createdAt window.")]
    async fn memory_search(
        &self,
        Parameters(req): Parameters<SearchRequest>,
        ct: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(project = %req.project_id, query = %req.query, "memory_search called");
        respond(self.services.notes.search_with_cancel(req, &ct).await)
    }

    #[tool(description = "Fetch a note by ID.")]
    async fn memory_get(
        &self,
        Parameters(params): Parameters<IdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.services.notes.get(&params.id).await)
    }

    #[tool(description = "Patch a note. Omitted fields are kept; null clears title, source or metadata. Changing text re-embeds the note.")]
    async fn memory_update(
        &self,
        Parameters(req): Parameters<UpdateNoteRequest>,
        ct: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(id = %req.id, "memory_update called");
        respond(self.services.notes.update_with_cancel(req, &ct).await)
    }

    #[tool(description = "Delete a note by ID.")]
    async fn memory_delete(
        &self,
        Parameters(params): Parameters<IdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(id = %params.id, "memory_delete called");
        respond(self.services.notes.delete(&params.id).await)
    }

    #[tool(description = "List a project's most recent notes by createdAt, newest first.")]
    async fn memory_list_recent(
        &self,
        Parameters(req): Parameters<ListRecentRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.services.notes.list_recent(req).await)
    }

    #[tool(description = "Show the current configuration (API key masked) and the active namespace.")]
    async fn memory_get_config(
        &self,
        Parameters(_params): Parameters<GetConfigParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(Ok::<_, MemoryError>(self.services.config.get_config()))
    }

    #[tool(description = "Switch the embedder provider, model, base URL or API key. Changing provider or model moves writes to a new namespace.")]
    async fn memory_set_config(
        &self,
        Parameters(params): Parameters<SetConfigParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(
            provider = ?params.embedder.provider,
            model = ?params.embedder.model,
            "memory_set_config called"
        );
        respond(self.services.config.set_config(params.embedder).await)
    }

    #[tool(description = "Create or overwrite a project-wide fact. Keys look like `global.<name>`; the value may be any JSON.")]
    async fn memory_upsert_global(
        &self,
        Parameters(req): Parameters<UpsertGlobalRequest>,
        ct: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(project = %req.project_id, key = %req.key, "memory_upsert_global called");
        respond(self.services.globals.upsert_global_with_cancel(req, &ct).await)
    }

    #[tool(description = "Look up a project-wide fact by key. Returns found=false when absent.")]
    async fn memory_get_global(
        &self,
        Parameters(req): Parameters<GetGlobalRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.services.globals.get_global(req).await)
    }

    #[tool(description = "Delete a project-wide fact by ID.")]
    async fn memory_delete_global(
        &self,
        Parameters(params): Parameters<IdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(id = %params.id, "memory_delete_global called");
        respond(self.services.globals.delete_global(&params.id).await)
    }

    #[tool(description = "Create a note group. groupKey is unique per project and may not be \"global\".")]
    async fn memory_create_group(
        &self,
        Parameters(req): Parameters<CreateGroupRequest>,
        ct: CancellationToken,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(
            project = %req.project_id,
            key = %req.group_key,
            "memory_create_group called"
        );
        respond(self.services.groups.create_group_with_cancel(req, &ct).await)
    }

    #[tool(description = "Fetch a group by ID.")]
    async fn memory_get_group(
        &self,
        Parameters(params): Parameters<IdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.services.groups.get_group(&params.id).await)
    }

    #[tool(description = "Patch a group's title or description. Null clears the description.")]
    async fn memory_update_group(
        &self,
        Parameters(req): Parameters<UpdateGroupRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(id = %req.id, "memory_update_group called");
        respond(self.services.groups.update_group(req).await)
    }

    #[tool(description = "Delete a group by ID. Its notes are kept.")]
    async fn memory_delete_group(
        &self,
        Parameters(params): Parameters<IdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        tracing::info!(id = %params.id, "memory_delete_group called");
        respond(self.services.groups.delete_group(&params.id).await)
    }

    #[tool(description = "List a project's groups in creation order.")]
    async fn memory_list_groups(
        &self,
        Parameters(params): Parameters<ProjectParams>,
    ) -> Result<CallToolResult, ErrorData> {
        respond(self.services.groups.list_groups(&params.project_id).await)
    }
}

#[tool_handler]
impl ServerHandler for MemoryTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "notemem stores project notes and facts with vector search. Use memory_add_note \
                 to save, memory_search to recall, and memory_upsert_global for key/value facts."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
