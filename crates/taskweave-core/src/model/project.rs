use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Patch, require_non_blank};

/// Opaque key/value metadata attached to a project.
pub type Metadata = Map<String, Value>;

/// Materialized project row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl NewProject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] when the name is blank.
    pub fn validate(&self) -> crate::Result<()> {
        require_non_blank("name", &self.name)
    }
}

/// Partial project update. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub name: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub description: Patch<Option<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub metadata: Patch<Option<Metadata>>,
}

impl ProjectPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_unset() && self.description.is_unset() && self.metadata.is_unset()
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] when a replacement name is blank.
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(name) = self.name.as_set() {
            require_non_blank("name", name)?;
        }
        Ok(())
    }
}
