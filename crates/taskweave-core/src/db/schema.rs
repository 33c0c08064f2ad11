//! Canonical SQLite schema for taskweave.
//!
//! - `events` is the append-only source of truth, versioned per aggregate
//! - `projects`, `tasks` and `comments` are materialized views derived from
//!   `events`; `rebuild` can regenerate them at any time
//! - `change_feed` is an append-only per-project log of observable changes
//! - `store_meta` holds rebuild bookkeeping
//!
//! Multi-valued task fields (assignees, tags, dependencies, custom fields)
//! are stored as JSON text. The materialized tables declare no foreign keys:
//! deleting a project or task leaves its children in place.
//!
//! The layout is created in one idempotent batch on open. There is no
//! upgrade path between layouts.

use rusqlite::Connection;

/// Event log, materialized tables, change feed, metadata and read-path
/// indexes.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id TEXT PRIMARY KEY,
    aggregate_type TEXT NOT NULL CHECK (aggregate_type IN ('project', 'task', 'comment')),
    aggregate_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    version INTEGER NOT NULL CHECK (version >= 1),
    UNIQUE (aggregate_type, aggregate_id, version)
);

CREATE TRIGGER IF NOT EXISTS events_reject_update
BEFORE UPDATE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END;

CREATE TRIGGER IF NOT EXISTS events_reject_delete
BEFORE DELETE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END;

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    title TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'todo'
        CHECK (status IN ('todo', 'in_progress', 'review', 'done')),
    assigned_to TEXT NOT NULL DEFAULT '[]',
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
    description TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    custom_fields TEXT NOT NULL DEFAULT '{}',
    dependencies TEXT NOT NULL DEFAULT '[]',
    position INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1)
);

CREATE TABLE IF NOT EXISTS comments (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    content TEXT NOT NULL,
    author TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS change_feed (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    change_type TEXT NOT NULL CHECK (change_type IN ('CREATED', 'UPDATED', 'DELETED')),
    entity_type TEXT NOT NULL CHECK (entity_type IN ('project', 'task', 'comment')),
    entity_id TEXT NOT NULL,
    delta TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1
);

CREATE TRIGGER IF NOT EXISTS change_feed_reject_update
BEFORE UPDATE ON change_feed
BEGIN
    SELECT RAISE(ABORT, 'change feed is append-only');
END;

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_rebuild_at TEXT,
    last_rebuild_event_count INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id) VALUES (1);

CREATE INDEX IF NOT EXISTS idx_events_aggregate_version
    ON events(aggregate_type, aggregate_id, version);

CREATE INDEX IF NOT EXISTS idx_events_type_timestamp
    ON events(event_type, timestamp);

CREATE INDEX IF NOT EXISTS idx_events_timestamp
    ON events(timestamp);

CREATE INDEX IF NOT EXISTS idx_tasks_project_position
    ON tasks(project_id, position);

CREATE INDEX IF NOT EXISTS idx_comments_task_timestamp
    ON comments(task_id, timestamp);

CREATE INDEX IF NOT EXISTS idx_projects_created
    ON projects(created_at DESC);

CREATE INDEX IF NOT EXISTS idx_change_feed_project_timestamp
    ON change_feed(project_id, timestamp);
"#;

/// Indexes created by [`SCHEMA_SQL`].
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_events_aggregate_version",
    "idx_events_type_timestamp",
    "idx_events_timestamp",
    "idx_tasks_project_position",
    "idx_comments_task_timestamp",
    "idx_projects_created",
    "idx_change_feed_project_timestamp",
];

/// Tables regenerated by a rebuild.
pub const MATERIALIZED_TABLES: &[&str] = &["projects", "tasks", "comments"];

/// Create every table, trigger and index that does not exist yet.
///
/// # Errors
///
/// Returns an error if SQLite rejects the batch.
pub fn bootstrap(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    tracing::debug!("store schema ready");
    Ok(())
}
