//! Tri-state partial-update fields.
//!
//! JSON distinguishes an absent field from an explicit `null`; [`Patch`]
//! keeps that distinction through to the services. Fields must be declared
//! with `#[serde(default)]` so that absence deserializes to [`Patch::Unset`].

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::validation::validate_group_id;
use crate::error::{MemoryError, Result};
use crate::memory::{Group, Note};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    /// Field absent: leave the stored value alone.
    Unset,
    /// Explicit `null`: clear the stored value.
    Null,
    /// Replace the stored value.
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Apply to an optional field: `Null` clears to `None`.
    pub fn apply_to(self, target: &mut Option<T>) {
        match self {
            Self::Unset => {}
            Self::Null => *target = None,
            Self::Value(v) => *target = Some(v),
        }
    }

    /// Apply to a non-optional field: `Null` resets to `T::default()`.
    pub fn apply_or_default(self, target: &mut T)
    where
        T: Default,
    {
        match self {
            Self::Unset => {}
            Self::Null => *target = T::default(),
            Self::Value(v) => *target = v,
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Value(v),
            None => Self::Null,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Only reached when the field is present, so `None` means `null`.
        Option::<T>::deserialize(deserializer).map(Into::into)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => v.serialize(serializer),
            Self::Unset | Self::Null => serializer.serialize_none(),
        }
    }
}

/// Changes to apply to a note.
///
/// `title`, `source` and `metadata` can be cleared with `null`; `text`,
/// `tags` and `groupId` can only be replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    /// New title, or `null` to clear it.
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schemars(with = "Option<String>")]
    pub title: Patch<String>,
    /// New text. Triggers re-embedding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// New source, or `null` to clear it.
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schemars(with = "Option<String>")]
    pub source: Patch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Replacement metadata object, or `null` to empty it.
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schemars(with = "Option<Map<String, Value>>")]
    pub metadata: Patch<Map<String, Value>>,
}

impl NotePatch {
    /// Reject values that would break note invariants, before any side effect.
    pub fn validate(&self) -> Result<()> {
        if self.text.as_deref() == Some("") {
            return Err(MemoryError::TextRequired);
        }
        if let Some(group_id) = &self.group_id {
            validate_group_id(group_id)?;
        }
        Ok(())
    }

    /// Whether applying this patch changes the embedded text.
    pub fn needs_reembed(&self) -> bool {
        self.text.is_some()
    }

    pub fn apply(self, note: &mut Note) {
        self.title.apply_to(&mut note.title);
        if let Some(text) = self.text {
            note.text = text;
        }
        if let Some(tags) = self.tags {
            note.tags = tags;
        }
        self.source.apply_to(&mut note.source);
        if let Some(group_id) = self.group_id {
            note.group_id = group_id;
        }
        self.metadata.apply_or_default(&mut note.metadata);
    }
}

/// Changes to apply to a group. `description` can be cleared with `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description, or `null` to clear it.
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    #[schemars(with = "Option<String>")]
    pub description: Patch<String>,
}

impl GroupPatch {
    pub fn validate(&self) -> Result<()> {
        if self.title.as_deref() == Some("") {
            return Err(MemoryError::TitleRequired);
        }
        Ok(())
    }

    pub fn apply(self, group: &mut Group) {
        if let Some(title) = self.title {
            group.title = title;
        }
        self.description.apply_or_default(&mut group.description);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn note() -> Note {
        Note {
            id: "n1".into(),
            project_id: "/p".into(),
            group_id: "g".into(),
            title: Some("old".into()),
            text: "text".into(),
            tags: vec!["a".into()],
            source: Some("src".into()),
            created_at: "2024-01-01T00:00:00Z".into(),
            metadata: json!({"k": 1}).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn absent_null_and_value_are_distinct() {
        let patch: NotePatch = serde_json::from_value(json!({})).unwrap();
        assert_eq!(patch.title, Patch::Unset);

        let patch: NotePatch = serde_json::from_value(json!({"title": null})).unwrap();
        assert_eq!(patch.title, Patch::Null);

        let patch: NotePatch = serde_json::from_value(json!({"title": "new"})).unwrap();
        assert_eq!(patch.title, Patch::Value("new".to_string()));
    }

    #[test]
    fn title_only_patch_leaves_other_fields() {
        let mut n = note();
        let patch: NotePatch = serde_json::from_value(json!({"title": "new"})).unwrap();
        assert!(!patch.needs_reembed());
        patch.apply(&mut n);
        assert_eq!(n.title.as_deref(), Some("new"));
        assert_eq!(n.text, "text");
        assert_eq!(n.source.as_deref(), Some("src"));
        assert_eq!(n.metadata["k"], 1);
    }

    #[test]
    fn null_clears_optional_fields() {
        let mut n = note();
        let patch: NotePatch =
            serde_json::from_value(json!({"title": null, "source": null, "metadata": null}))
                .unwrap();
        patch.apply(&mut n);
        assert_eq!(n.title, None);
        assert_eq!(n.source, None);
        assert!(n.metadata.is_empty());
    }

    #[test]
    fn text_change_requires_reembed() {
        let patch: NotePatch = serde_json::from_value(json!({"text": "new text"})).unwrap();
        assert!(patch.needs_reembed());
    }

    #[test]
    fn validation_rejects_broken_values() {
        let empty_text: NotePatch = serde_json::from_value(json!({"text": ""})).unwrap();
        assert!(matches!(empty_text.validate(), Err(MemoryError::TextRequired)));

        let bad_group: NotePatch = serde_json::from_value(json!({"groupId": "a b"})).unwrap();
        assert!(matches!(bad_group.validate(), Err(MemoryError::InvalidGroupId(_))));

        let empty_title: GroupPatch = serde_json::from_value(json!({"title": ""})).unwrap();
        assert!(matches!(empty_title.validate(), Err(MemoryError::TitleRequired)));
    }

    #[test]
    fn group_description_null_clears() {
        let mut g = Group {
            id: "g1".into(),
            project_id: "/p".into(),
            group_key: "k".into(),
            title: "T".into(),
            description: "D".into(),
            created_at: "x".into(),
            updated_at: "x".into(),
        };
        let patch: GroupPatch = serde_json::from_value(json!({"description": null})).unwrap();
        patch.apply(&mut g);
        assert_eq!(g.description, "");
        assert_eq!(g.title, "T");
    }

    #[test]
    fn unset_fields_are_skipped_when_serialized() {
        let patch = NotePatch {
            source: Patch::Null,
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"source": null}));
    }
}
