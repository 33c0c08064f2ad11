//! Read queries over the materialized tables.
//!
//! JSON-encoded columns are decoded inside the row mapper; a malformed value
//! surfaces as a conversion failure on that column.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;

use crate::Result;
use crate::model::{Comment, Project, Task, TaskConfiguration};

// ---------------------------------------------------------------------------
// Column helpers
// ---------------------------------------------------------------------------

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn optional_json_column<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        serde_json::from_str(&raw).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
        })
    })
    .transpose()
}

fn parsed_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

const PROJECT_COLUMNS: &str = "id, name, description, metadata, created_at, updated_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        metadata: optional_json_column(row, 3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], project_from_row).optional()?)
}

/// All projects, newest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_projects(conn: &Connection) -> Result<Vec<Project>> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at DESC, rowid DESC");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], project_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn project_exists(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM projects WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

/// Number of materialized tasks whose `project_id` is `project_id`.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn task_count(conn: &Connection, project_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE project_id = ?1",
        [project_id],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

const TASK_COLUMNS: &str = "id, project_id, title, status, assigned_to, priority, description, \
     tags, custom_fields, dependencies, position, created_at, updated_at, version";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        status: parsed_column(row, 3)?,
        assigned_to: json_column(row, 4)?,
        configuration: TaskConfiguration {
            priority: parsed_column(row, 5)?,
            description: row.get(6)?,
            tags: json_column(row, 7)?,
            custom_fields: json_column(row, 8)?,
        },
        dependencies: json_column(row, 9)?,
        position: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        version: row.get(13)?,
    })
}

/// # Errors
///
/// Returns an error if the query fails or a row cannot be decoded.
pub fn find_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], task_from_row).optional()?)
}

/// Tasks of a project ordered by board position.
///
/// # Errors
///
/// Returns an error if the query fails or a row cannot be decoded.
pub fn tasks_for_project(conn: &Connection, project_id: &str) -> Result<Vec<Task>> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ?1
         ORDER BY position ASC, created_at ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![project_id], task_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Position for a task appended to the end of a project's board: one past
/// the current maximum, or 0 for an empty board.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn next_task_position(conn: &Connection, project_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM tasks WHERE project_id = ?1",
        [project_id],
        |row| row.get(0),
    )?)
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn task_project_id(conn: &Connection, task_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT project_id FROM tasks WHERE id = ?1",
            [task_id],
            |row| row.get(0),
        )
        .optional()?)
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

const COMMENT_COLUMNS: &str = "id, task_id, content, author, timestamp";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        content: row.get(2)?,
        author: row.get(3)?,
        timestamp: row.get(4)?,
    })
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn find_comment(conn: &Connection, id: &str) -> Result<Option<Comment>> {
    let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], comment_from_row).optional()?)
}

/// Comments on a task, oldest first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn comments_for_task(conn: &Connection, task_id: &str) -> Result<Vec<Comment>> {
    let sql = format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE task_id = ?1
         ORDER BY timestamp ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([task_id], comment_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Row counts of the materialized tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub projects: usize,
    pub tasks: usize,
    pub comments: usize,
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn table_counts(conn: &Connection) -> Result<TableCounts> {
    let (projects, tasks, comments): (i64, i64, i64) = conn.query_row(
        "SELECT (SELECT COUNT(*) FROM projects),
                (SELECT COUNT(*) FROM tasks),
                (SELECT COUNT(*) FROM comments)",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(TableCounts {
        projects: usize::try_from(projects).unwrap_or_default(),
        tasks: usize::try_from(tasks).unwrap_or_default(),
        comments: usize::try_from(comments).unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::model::{Priority, TaskStatus};

    fn insert_task(conn: &Connection, id: &str, project_id: &str, position: i64) {
        conn.execute(
            "INSERT INTO tasks (id, project_id, title, position, created_at, updated_at, priority, tags)
             VALUES (?1, ?2, ?1, ?3, 't', 't', 'high', '[\"x\"]')",
            params![id, project_id, position],
        )
        .expect("insert task");
    }

    #[test]
    fn tasks_decode_defaults_and_json_columns() {
        let store = Store::open_in_memory().expect("open");
        store
            .transact(|conn| {
                insert_task(conn, "t1", "p1", 0);
                Ok(())
            })
            .expect("seed");

        let task = store
            .read(|conn| find_task(conn, "t1"))
            .expect("read")
            .expect("task exists");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.configuration.priority, Priority::High);
        assert_eq!(task.configuration.tags, vec!["x".to_string()]);
        assert!(task.assigned_to.is_empty());
        assert!(task.configuration.custom_fields.is_empty());
        assert_eq!(task.version, 1);
    }

    #[test]
    fn tasks_are_ordered_by_position() {
        let store = Store::open_in_memory().expect("open");
        store
            .transact(|conn| {
                insert_task(conn, "b", "p1", 1);
                insert_task(conn, "a", "p1", 0);
                insert_task(conn, "z", "p2", 0);
                Ok(())
            })
            .expect("seed");

        let ids: Vec<String> = store
            .read(|conn| tasks_for_project(conn, "p1"))
            .expect("read")
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.read(|conn| next_task_position(conn, "p1")).expect("pos"), 2);
        assert_eq!(store.read(|conn| next_task_position(conn, "empty")).expect("pos"), 0);
        assert_eq!(store.read(|conn| task_count(conn, "p1")).expect("count"), 2);
    }

    #[test]
    fn malformed_json_column_is_an_error() {
        let store = Store::open_in_memory().expect("open");
        store
            .transact(|conn| {
                conn.execute(
                    "INSERT INTO tasks (id, project_id, title, position, created_at, updated_at, tags)
                     VALUES ('t1', 'p1', 't', 0, 't', 't', 'not json')",
                    [],
                )?;
                Ok(())
            })
            .expect("seed");
        assert!(store.read(|conn| find_task(conn, "t1")).is_err());
    }

    #[test]
    fn missing_rows_are_none() {
        let store = Store::open_in_memory().expect("open");
        assert!(store.read(|conn| find_project(conn, "x")).expect("read").is_none());
        assert!(store.read(|conn| find_comment(conn, "x")).expect("read").is_none());
        assert!(!store.read(|conn| project_exists(conn, "x")).expect("read"));
    }
}
