use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::EmbedderPatch;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct IdParams {
    #[schemars(description = "ID of the record")]
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectParams {
    #[schemars(description = "Project path; `~` is expanded and symlinks are resolved")]
    pub project_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct GetConfigParams {}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SetConfigParams {
    #[schemars(description = "Embedder fields to change; omitted fields keep their value")]
    #[serde(default)]
    pub embedder: EmbedderPatch,
}
