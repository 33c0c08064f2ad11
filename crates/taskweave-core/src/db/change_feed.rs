//! Per-project change feed: one row per observable change, written in the
//! same transaction as the event it describes.

use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::event::{AggregateType, EventType};
use crate::model::new_id;
use crate::{Error, Result};

/// Kind of entity a change-feed row describes. Same names as aggregates.
pub type EntityType = AggregateType;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl ChangeType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
            Self::Deleted => "DELETED",
        }
    }

    /// Change kind implied by an event type.
    #[must_use]
    pub const fn for_event(event_type: EventType) -> Self {
        match event_type {
            EventType::ProjectCreated | EventType::TaskCreated | EventType::CommentAdded => {
                Self::Created
            }
            EventType::ProjectUpdated | EventType::TaskUpdated => Self::Updated,
            EventType::ProjectDeleted | EventType::TaskDeleted | EventType::CommentDeleted => {
                Self::Deleted
            }
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATED" => Ok(Self::Created),
            "UPDATED" => Ok(Self::Updated),
            "DELETED" => Ok(Self::Deleted),
            other => Err(Error::validation(
                "changeType",
                format!("'{other}' is not one of CREATED, UPDATED, DELETED"),
            )),
        }
    }
}

/// One change-feed row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeFeedEntry {
    pub id: String,
    pub project_id: String,
    pub change_type: ChangeType,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub delta: Value,
    pub timestamp: String,
    pub version: i64,
}

/// Insert a change-feed row. Entries are written with version 1.
///
/// # Errors
///
/// Returns an error if the delta cannot be encoded or the insert fails.
pub fn append_entry(
    conn: &Connection,
    project_id: &str,
    change_type: ChangeType,
    entity_type: EntityType,
    entity_id: &str,
    delta: &Value,
    timestamp: &str,
) -> Result<ChangeFeedEntry> {
    let entry = ChangeFeedEntry {
        id: new_id(),
        project_id: project_id.to_string(),
        change_type,
        entity_type,
        entity_id: entity_id.to_string(),
        delta: delta.clone(),
        timestamp: timestamp.to_string(),
        version: 1,
    };

    conn.execute(
        "INSERT INTO change_feed (id, project_id, change_type, entity_type, entity_id, delta, timestamp, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            entry.project_id,
            entry.change_type.as_str(),
            entry.entity_type.as_str(),
            entry.entity_id,
            serde_json::to_string(&entry.delta)?,
            entry.timestamp,
            entry.version,
        ],
    )?;
    Ok(entry)
}

/// Change-feed rows for a project strictly after `since`, ascending by
/// timestamp then append order.
///
/// # Errors
///
/// Returns an error if the query fails or a stored row cannot be decoded.
pub fn entries_since(
    conn: &Connection,
    project_id: &str,
    since: &str,
) -> Result<Vec<ChangeFeedEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, change_type, entity_type, entity_id, delta, timestamp, version
         FROM change_feed
         WHERE project_id = ?1 AND timestamp > ?2
         ORDER BY timestamp ASC, rowid ASC",
    )?;
    let rows = stmt.query_map(params![project_id, since], RawEntry::from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?.decode()?);
    }
    Ok(entries)
}

struct RawEntry {
    id: String,
    project_id: String,
    change_type: String,
    entity_type: String,
    entity_id: String,
    delta: String,
    timestamp: String,
    version: i64,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            change_type: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            delta: row.get(5)?,
            timestamp: row.get(6)?,
            version: row.get(7)?,
        })
    }

    fn decode(self) -> Result<ChangeFeedEntry> {
        let entity_type = self
            .entity_type
            .parse()
            .map_err(|err: crate::event::types::UnknownAggregateType| {
                Error::validation("entityType", err.to_string())
            })?;
        Ok(ChangeFeedEntry {
            id: self.id,
            project_id: self.project_id,
            change_type: self.change_type.parse()?,
            entity_type,
            entity_id: self.entity_id,
            delta: serde_json::from_str(&self.delta)?,
            timestamp: self.timestamp,
            version: self.version,
        })
    }
}
