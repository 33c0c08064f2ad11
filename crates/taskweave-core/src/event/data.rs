//! Typed payload data for each event type.
//!
//! Creation events carry the full entity, updates carry the id plus a patch
//! of the fields that changed, deletions carry ids only.

use serde::{Deserialize, Serialize};

use super::types::{AggregateType, EventType};
use crate::model::{Comment, Project, ProjectPatch, Task, TaskPatch};

// ---------------------------------------------------------------------------
// EventData: the unified payload enum
// ---------------------------------------------------------------------------

/// Typed payload for an event. The discriminant is stored in its own column,
/// not inside the JSON payload.
///
/// `EventData` implements `Serialize` by dispatching to the inner struct. Use
/// [`EventData::deserialize_for`] with the stored [`EventType`] to decode.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    ProjectCreated(Project),
    ProjectUpdated(ProjectUpdatedData),
    ProjectDeleted(DeletedData),
    TaskCreated(Task),
    TaskUpdated(TaskUpdatedData),
    TaskDeleted(TaskDeletedData),
    CommentAdded(Comment),
    CommentDeleted(CommentDeletedData),
}

impl EventData {
    /// Event type discriminant for this payload.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::ProjectCreated(_) => EventType::ProjectCreated,
            Self::ProjectUpdated(_) => EventType::ProjectUpdated,
            Self::ProjectDeleted(_) => EventType::ProjectDeleted,
            Self::TaskCreated(_) => EventType::TaskCreated,
            Self::TaskUpdated(_) => EventType::TaskUpdated,
            Self::TaskDeleted(_) => EventType::TaskDeleted,
            Self::CommentAdded(_) => EventType::CommentAdded,
            Self::CommentDeleted(_) => EventType::CommentDeleted,
        }
    }

    #[must_use]
    pub const fn aggregate_type(&self) -> AggregateType {
        self.event_type().aggregate_type()
    }

    /// Id of the aggregate this payload mutates.
    #[must_use]
    pub fn aggregate_id(&self) -> &str {
        match self {
            Self::ProjectCreated(p) => &p.id,
            Self::ProjectUpdated(d) => &d.id,
            Self::ProjectDeleted(d) => &d.id,
            Self::TaskCreated(t) => &t.id,
            Self::TaskUpdated(d) => &d.id,
            Self::TaskDeleted(d) => &d.id,
            Self::CommentAdded(c) => &c.id,
            Self::CommentDeleted(d) => &d.id,
        }
    }

    /// Decode a stored JSON payload into the variant matching `event_type`.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the payload does not match the schema for the
    /// given event type.
    pub fn deserialize_for(event_type: EventType, json: &str) -> serde_json::Result<Self> {
        Ok(match event_type {
            EventType::ProjectCreated => Self::ProjectCreated(serde_json::from_str(json)?),
            EventType::ProjectUpdated => Self::ProjectUpdated(serde_json::from_str(json)?),
            EventType::ProjectDeleted => Self::ProjectDeleted(serde_json::from_str(json)?),
            EventType::TaskCreated => Self::TaskCreated(serde_json::from_str(json)?),
            EventType::TaskUpdated => Self::TaskUpdated(serde_json::from_str(json)?),
            EventType::TaskDeleted => Self::TaskDeleted(serde_json::from_str(json)?),
            EventType::CommentAdded => Self::CommentAdded(serde_json::from_str(json)?),
            EventType::CommentDeleted => Self::CommentDeleted(serde_json::from_str(json)?),
        })
    }

    /// Serialize the payload to a [`serde_json::Value`].
    ///
    /// # Errors
    ///
    /// Returns an error if the inner struct fails to serialize.
    pub fn to_json_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

impl Serialize for EventData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::ProjectCreated(d) => d.serialize(serializer),
            Self::ProjectUpdated(d) => d.serialize(serializer),
            Self::ProjectDeleted(d) => d.serialize(serializer),
            Self::TaskCreated(d) => d.serialize(serializer),
            Self::TaskUpdated(d) => d.serialize(serializer),
            Self::TaskDeleted(d) => d.serialize(serializer),
            Self::CommentAdded(d) => d.serialize(serializer),
            Self::CommentDeleted(d) => d.serialize(serializer),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// Payload for `PROJECT_UPDATED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdatedData {
    pub id: String,
    #[serde(flatten)]
    pub patch: ProjectPatch,
    pub updated_at: String,
}

/// Payload for `PROJECT_DELETED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedData {
    pub id: String,
}

/// Payload for `TASK_UPDATED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdatedData {
    pub id: String,
    #[serde(flatten)]
    pub patch: TaskPatch,
}

/// Payload for `TASK_DELETED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDeletedData {
    pub id: String,
    pub project_id: String,
}

/// Payload for `COMMENT_DELETED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeletedData {
    pub id: String,
    pub task_id: String,
}
