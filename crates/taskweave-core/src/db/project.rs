//! Event → materialized table projection.
//!
//! The [`Projector`] applies one [`DomainEvent`] to the `projects`, `tasks`
//! and `comments` tables and appends change-feed rows. It never opens its
//! own transaction: repositories call it inside the transaction that
//! appended the event, and [`super::rebuild`] calls it inside the replay
//! transaction.
//!
//! Deletes remove exactly one row and never cascade. Updates touch only the
//! columns present in the patch.

use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};

use crate::db::change_feed::{self, ChangeFeedEntry, ChangeType, EntityType};
use crate::event::data::{CommentDeletedData, DeletedData, ProjectUpdatedData, TaskDeletedData, TaskUpdatedData};
use crate::event::{AggregateType, DomainEvent, EventData};
use crate::model::{Comment, Project, Task, now_timestamp};
use crate::{Error, Result};

/// Applies events to the materialized tables.
pub struct Projector<'conn> {
    conn: &'conn Connection,
}

impl<'conn> Projector<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns an error if a write fails, a JSON column cannot be encoded, or
    /// an update targets a task or project with no materialized row.
    pub fn project(&self, event: &DomainEvent) -> Result<()> {
        debug_assert_eq!(event.event_type, event.payload.event_type());

        match &event.payload {
            EventData::ProjectCreated(project) => self.project_project_created(project)?,
            EventData::ProjectUpdated(data) => self.project_project_updated(data)?,
            EventData::ProjectDeleted(data) => self.project_project_deleted(data)?,
            EventData::TaskCreated(task) => self.project_task_created(task)?,
            EventData::TaskUpdated(data) => self.project_task_updated(data, &event.timestamp)?,
            EventData::TaskDeleted(data) => self.project_task_deleted(data)?,
            EventData::CommentAdded(comment) => self.project_comment_added(comment)?,
            EventData::CommentDeleted(data) => self.project_comment_deleted(data)?,
        }

        tracing::debug!(
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            version = event.version,
            "event projected"
        );
        Ok(())
    }

    /// Append a change-feed row for `project_id`, stamped with the current
    /// time.
    ///
    /// # Errors
    ///
    /// Returns an error if the delta cannot be encoded or the insert fails.
    pub fn add_to_change_feed(
        &self,
        project_id: &str,
        change_type: ChangeType,
        entity_type: EntityType,
        entity_id: &str,
        delta: &serde_json::Value,
    ) -> Result<ChangeFeedEntry> {
        change_feed::append_entry(
            self.conn,
            project_id,
            change_type,
            entity_type,
            entity_id,
            delta,
            &now_timestamp(),
        )
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    fn project_project_created(&self, project: &Project) -> Result<()> {
        let metadata = project
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT INTO projects (id, name, description, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                project.id,
                project.name,
                project.description,
                metadata,
                project.created_at,
                project.updated_at,
            ],
        )?;
        Ok(())
    }

    fn project_project_updated(&self, data: &ProjectUpdatedData) -> Result<()> {
        let mut sets = Assignments::default();
        if let Some(name) = data.patch.name.as_set() {
            sets.push("name", Value::Text(name.clone()));
        }
        if let Some(description) = data.patch.description.as_set() {
            sets.push("description", optional_text(description.clone()));
        }
        if let Some(metadata) = data.patch.metadata.as_set() {
            let encoded = metadata.as_ref().map(serde_json::to_string).transpose()?;
            sets.push("metadata", optional_text(encoded));
        }
        sets.push("updated_at", Value::Text(data.updated_at.clone()));

        let changed = sets.execute(self.conn, "projects", "", &data.id)?;
        require_row(changed, AggregateType::Project, &data.id)
    }

    fn project_project_deleted(&self, data: &DeletedData) -> Result<()> {
        self.conn
            .execute("DELETE FROM projects WHERE id = ?1", [&data.id])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    fn project_task_created(&self, task: &Task) -> Result<()> {
        let config = &task.configuration;
        self.conn.execute(
            "INSERT INTO tasks (
                id, project_id, title, status, assigned_to, priority, description,
                tags, custom_fields, dependencies, position, created_at, updated_at, version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                task.id,
                task.project_id,
                task.title,
                task.status.as_str(),
                serde_json::to_string(&task.assigned_to)?,
                config.priority.as_str(),
                config.description,
                serde_json::to_string(&config.tags)?,
                serde_json::to_string(&config.custom_fields)?,
                serde_json::to_string(&task.dependencies)?,
                task.position,
                task.created_at,
                task.updated_at,
                task.version,
            ],
        )?;
        Ok(())
    }

    fn project_task_updated(&self, data: &TaskUpdatedData, timestamp: &str) -> Result<()> {
        let patch = &data.patch;
        let config = &patch.configuration;
        let mut sets = Assignments::default();

        if let Some(title) = patch.title.as_set() {
            sets.push("title", Value::Text(title.clone()));
        }
        if let Some(status) = patch.status.as_set() {
            sets.push("status", Value::Text(status.as_str().to_string()));
        }
        if let Some(assigned_to) = patch.assigned_to.as_set() {
            sets.push("assigned_to", Value::Text(serde_json::to_string(assigned_to)?));
        }
        if let Some(priority) = config.priority.as_set() {
            sets.push("priority", Value::Text(priority.as_str().to_string()));
        }
        if let Some(description) = config.description.as_set() {
            sets.push("description", Value::Text(description.clone()));
        }
        if let Some(tags) = config.tags.as_set() {
            sets.push("tags", Value::Text(serde_json::to_string(tags)?));
        }
        if let Some(custom_fields) = config.custom_fields.as_set() {
            sets.push("custom_fields", Value::Text(serde_json::to_string(custom_fields)?));
        }
        if let Some(dependencies) = patch.dependencies.as_set() {
            sets.push("dependencies", Value::Text(serde_json::to_string(dependencies)?));
        }
        if let Some(position) = patch.position.as_set() {
            sets.push("position", Value::Integer(*position));
        }
        sets.push("updated_at", Value::Text(timestamp.to_string()));

        let changed = sets.execute(self.conn, "tasks", ", version = version + 1", &data.id)?;
        require_row(changed, AggregateType::Task, &data.id)
    }

    fn project_task_deleted(&self, data: &TaskDeletedData) -> Result<()> {
        self.conn
            .execute("DELETE FROM tasks WHERE id = ?1", [&data.id])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    fn project_comment_added(&self, comment: &Comment) -> Result<()> {
        self.conn.execute(
            "INSERT INTO comments (id, task_id, content, author, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comment.id,
                comment.task_id,
                comment.content,
                comment.author,
                comment.timestamp,
            ],
        )?;
        Ok(())
    }

    fn project_comment_deleted(&self, data: &CommentDeletedData) -> Result<()> {
        self.conn
            .execute("DELETE FROM comments WHERE id = ?1", [&data.id])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dynamic UPDATE builder
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Assignments {
    columns: Vec<&'static str>,
    values: Vec<Value>,
}

impl Assignments {
    fn push(&mut self, column: &'static str, value: Value) {
        self.columns.push(column);
        self.values.push(value);
    }

    /// Run `UPDATE <table> SET <assignments><extra> WHERE id = ?` and return
    /// the number of rows changed.
    fn execute(self, conn: &Connection, table: &str, extra: &str, id: &str) -> Result<usize> {
        let assignments: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| format!("{column} = ?{}", idx + 1))
            .collect();
        let sql = format!(
            "UPDATE {table} SET {}{extra} WHERE id = ?{}",
            assignments.join(", "),
            self.columns.len() + 1
        );

        let mut values = self.values;
        values.push(Value::Text(id.to_string()));
        Ok(conn.execute(&sql, params_from_iter(values))?)
    }
}

fn optional_text(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::Text)
}

fn require_row(changed: usize, kind: AggregateType, id: &str) -> Result<()> {
    if changed == 0 {
        return Err(Error::NotFound {
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}
