//! Core record definitions.
//!
//! [`Note`] is a free-text memory with tags and metadata, [`Group`] a named
//! bucket of notes inside a project, and [`GlobalFact`] a project-wide
//! key/value pair. All three serialize with camelCase field names, which is
//! the shape the tool layer returns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored note. Its embedding is kept alongside by the store, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// UUID v7 primary key.
    pub id: String,
    /// Canonicalized absolute project path.
    pub project_id: String,
    pub group_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// RFC3339 timestamp, stored verbatim as supplied or generated.
    pub created_at: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A note group, unique by `(namespace, project_id, group_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub project_id: String,
    pub group_key: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A project-wide fact, unique by `(namespace, project_id, key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalFact {
    pub id: String,
    pub project_id: String,
    /// Always starts with `global.`.
    pub key: String,
    pub value: Value,
    pub updated_at: String,
}

/// A note returned from vector search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredNote {
    #[serde(flatten)]
    pub note: Note,
    /// Cosine similarity rescaled to `[0, 1]`.
    pub score: f64,
}
