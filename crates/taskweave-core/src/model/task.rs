use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

use super::{Patch, require_non_blank};

/// Board column a task sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub const ALL: [Self; 4] = [Self::Todo, Self::InProgress, Self::Review, Self::Done];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ident, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = crate::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| {
                        let expected: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                        crate::Error::validation(
                            $what,
                            format!("'{s}' is not one of {}", expected.join(", ")),
                        )
                    })
            }
        }
    };
}

impl_str_enum!(TaskStatus, "status");
impl_str_enum!(Priority, "priority");

/// Per-task configuration block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfiguration {
    pub priority: Priority,
    pub description: String,
    pub tags: Vec<String>,
    pub custom_fields: Map<String, Value>,
}

/// Materialized task row.
///
/// `version` is the materialized update counter: 1 at creation, +1 per
/// update. It is independent of the event-log version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub assigned_to: Vec<String>,
    pub configuration: TaskConfiguration,
    pub dependencies: Vec<String>,
    pub position: i64,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default = "initial_version")]
    pub version: i64,
}

const fn initial_version() -> i64 {
    1
}

/// Partial configuration. Used both to seed a new task (unset fields take
/// defaults) and to patch an existing one (unset fields stay untouched).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfigurationPatch {
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub priority: Patch<Priority>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub description: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub tags: Patch<Vec<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub custom_fields: Patch<Map<String, Value>>,
}

impl TaskConfigurationPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.priority.is_unset()
            && self.description.is_unset()
            && self.tags.is_unset()
            && self.custom_fields.is_unset()
    }

    /// Fold this patch over `base`.
    #[must_use]
    pub fn applied_to(self, mut base: TaskConfiguration) -> TaskConfiguration {
        self.priority.apply_to(&mut base.priority);
        self.description.apply_to(&mut base.description);
        self.tags.apply_to(&mut base.tags);
        self.custom_fields.apply_to(&mut base.custom_fields);
        base
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default)]
    pub configuration: TaskConfigurationPatch,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl NewTask {
    pub fn new(project_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for a blank title or project id,
    /// or a blank dependency entry.
    pub fn validate(&self) -> crate::Result<()> {
        require_non_blank("projectId", &self.project_id)?;
        require_non_blank("title", &self.title)?;
        validate_dependency_ids(&self.dependencies)
    }
}

/// Partial task update. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub title: Patch<String>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub status: Patch<TaskStatus>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub assigned_to: Patch<Vec<String>>,
    #[serde(default, skip_serializing_if = "TaskConfigurationPatch::is_empty")]
    pub configuration: TaskConfigurationPatch,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub dependencies: Patch<Vec<String>>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub position: Patch<i64>,
}

impl TaskPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_unset()
            && self.status.is_unset()
            && self.assigned_to.is_unset()
            && self.configuration.is_empty()
            && self.dependencies.is_unset()
            && self.position.is_unset()
    }

    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] for a blank replacement title or
    /// a blank dependency entry.
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(title) = self.title.as_set() {
            require_non_blank("title", title)?;
        }
        if let Some(deps) = self.dependencies.as_set() {
            validate_dependency_ids(deps)?;
        }
        Ok(())
    }
}

fn validate_dependency_ids(deps: &[String]) -> crate::Result<()> {
    if deps.iter().any(|dep| dep.trim().is_empty()) {
        return Err(crate::Error::validation(
            "dependencies",
            "dependency ids must not be empty",
        ));
    }
    Ok(())
}
