//! Domain entities, creation inputs, and partial-update patches.

pub mod comment;
pub mod project;
pub mod task;

use chrono::{SecondsFormat, Utc};
use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use comment::{Comment, NewComment};
pub use project::{NewProject, Project, ProjectPatch};
pub use task::{
    NewTask, Priority, Task, TaskConfiguration, TaskConfigurationPatch, TaskPatch, TaskStatus,
};

/// Length of generated ids (same alphabet width as the wire ids clients expect).
pub const ID_LEN: usize = 21;

/// Generate a fresh opaque id.
#[must_use]
pub fn new_id() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), ID_LEN)
}

/// Current wall-clock time as an ISO-8601 UTC string with millisecond precision.
///
/// The fixed-width format keeps lexicographic and chronological order equal.
#[must_use]
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One field of a partial update: either left untouched or replaced.
///
/// `Patch<Option<T>>` distinguishes "omitted" (`Unset`) from "explicitly
/// cleared" (`Set(None)`). On the wire an unset field is absent and a set
/// field carries its value (including `null`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Unset,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Patch<T> {
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    #[must_use]
    pub const fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Borrow the replacement value, if any.
    #[must_use]
    pub const fn as_set(&self) -> Option<&T> {
        match self {
            Self::Unset => None,
            Self::Set(value) => Some(value),
        }
    }

    /// Apply this patch to `target`, replacing it when set.
    pub fn apply_to(self, target: &mut T) {
        if let Self::Set(value) = self {
            *target = value;
        }
    }
}

impl<T> From<T> for Patch<T> {
    fn from(value: T) -> Self {
        Self::Set(value)
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unset => serializer.serialize_none(),
            Self::Set(value) => value.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self::Set)
    }
}

pub(crate) fn require_non_blank(field: &'static str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::validation(field, "must not be empty"));
    }
    Ok(())
}
