//! Event and aggregate type enums for the closed event catalog.
//!
//! Event types use the `SCREAMING_SNAKE` names stored in the `events.event_type`
//! column; aggregate types use the lowercase names stored in
//! `events.aggregate_type`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of aggregate tracked by the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateType {
    Project,
    Task,
    Comment,
}

impl AggregateType {
    /// Canonical lowercase name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Task => "task",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateType {
    type Err = UnknownAggregateType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "task" => Ok(Self::Task),
            "comment" => Ok(Self::Comment),
            _ => Err(UnknownAggregateType { raw: s.to_string() }),
        }
    }
}

/// Error returned when parsing an unknown aggregate type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown aggregate type '{raw}': expected one of project, task, comment")]
pub struct UnknownAggregateType {
    pub raw: String,
}

/// The eight event types in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    CommentAdded,
    CommentDeleted,
}

/// Error returned when an event row carries a type outside the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "unknown event type '{raw}': expected one of PROJECT_CREATED, PROJECT_UPDATED, \
     PROJECT_DELETED, TASK_CREATED, TASK_UPDATED, TASK_DELETED, COMMENT_ADDED, COMMENT_DELETED"
)]
pub struct UnknownEventType {
    /// The unrecognised input string.
    pub raw: String,
}

impl EventType {
    /// All known event types in catalog order.
    pub const ALL: [Self; 8] = [
        Self::ProjectCreated,
        Self::ProjectUpdated,
        Self::ProjectDeleted,
        Self::TaskCreated,
        Self::TaskUpdated,
        Self::TaskDeleted,
        Self::CommentAdded,
        Self::CommentDeleted,
    ];

    /// Return the canonical storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProjectCreated => "PROJECT_CREATED",
            Self::ProjectUpdated => "PROJECT_UPDATED",
            Self::ProjectDeleted => "PROJECT_DELETED",
            Self::TaskCreated => "TASK_CREATED",
            Self::TaskUpdated => "TASK_UPDATED",
            Self::TaskDeleted => "TASK_DELETED",
            Self::CommentAdded => "COMMENT_ADDED",
            Self::CommentDeleted => "COMMENT_DELETED",
        }
    }

    /// The aggregate kind this event type belongs to.
    #[must_use]
    pub const fn aggregate_type(self) -> AggregateType {
        match self {
            Self::ProjectCreated | Self::ProjectUpdated | Self::ProjectDeleted => {
                AggregateType::Project
            }
            Self::TaskCreated | Self::TaskUpdated | Self::TaskDeleted => AggregateType::Task,
            Self::CommentAdded | Self::CommentDeleted => AggregateType::Comment,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| UnknownEventType { raw: s.to_string() })
    }
}

// Custom serde: serialize as the storage string.
impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
