//! Full rebuild of the materialized tables from the event log.
//!
//! The materialized tables are disposable: clearing them and replaying every
//! event in append order must reproduce them exactly. The change feed is an
//! independent append-only log and is left untouched.

use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::Result;
use crate::db::{Store, event_store, project::Projector, query, schema};
use crate::model::now_timestamp;

/// Report returned after a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Events replayed from the log.
    pub event_count: usize,
    pub project_count: usize,
    pub task_count: usize,
    pub comment_count: usize,
    /// Wall-clock time spent inside the replay transaction.
    pub elapsed: Duration,
}

/// Clear `projects`, `tasks` and `comments` and replay the whole event log
/// inside one immediate transaction.
///
/// An event whose type or payload cannot be decoded aborts the rebuild and
/// leaves the previous tables in place.
///
/// # Errors
///
/// Returns [`crate::Error::UnknownEventType`] or [`crate::Error::Payload`]
/// for an undecodable event, or a storage error.
pub fn rebuild(store: &Store) -> Result<RebuildReport> {
    let start = Instant::now();
    let report = store.transact(|conn| replay_all(conn, start))?;

    tracing::info!(
        events = report.event_count,
        projects = report.project_count,
        tasks = report.task_count,
        comments = report.comment_count,
        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "materialized tables rebuilt"
    );
    Ok(report)
}

fn replay_all(conn: &Connection, start: Instant) -> Result<RebuildReport> {
    for table in schema::MATERIALIZED_TABLES {
        conn.execute(&format!("DELETE FROM {table}"), [])?;
    }

    let events = event_store::all_events(conn)?;
    let projector = Projector::new(conn);
    for event in &events {
        projector.project(event)?;
    }

    let event_count = i64::try_from(events.len()).unwrap_or(i64::MAX);
    conn.execute(
        "UPDATE store_meta SET last_rebuild_at = ?1, last_rebuild_event_count = ?2 WHERE id = 1",
        rusqlite::params![now_timestamp(), event_count],
    )?;

    let counts = query::table_counts(conn)?;
    Ok(RebuildReport {
        event_count: events.len(),
        project_count: counts.projects,
        task_count: counts.tasks,
        comment_count: counts.comments,
        elapsed: start.elapsed(),
    })
}
