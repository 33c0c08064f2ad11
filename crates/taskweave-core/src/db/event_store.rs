//! Append-only event log.
//!
//! [`append`] must run on a connection inside an immediate transaction owned
//! by the caller (see [`super::Store::transact`]); the version read and the
//! insert then happen under the write lock, so concurrent appends to one
//! aggregate can never observe the same `max(version)`.

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::event::{AggregateType, DomainEvent, EventData};
use crate::model::{new_id, now_timestamp};
use crate::Result;

const EVENT_COLUMNS: &str = "id, aggregate_id, event_type, payload, timestamp, version";

/// Persist a new event for the aggregate identified by `data`.
///
/// The version is `max(version) + 1` over existing events for the same
/// `(aggregate_type, aggregate_id)`, or 1 for a new aggregate.
///
/// # Errors
///
/// Returns an error if the payload cannot be encoded or the insert fails.
pub fn append(conn: &Connection, data: EventData) -> Result<DomainEvent> {
    debug_assert!(
        !conn.is_autocommit(),
        "event append must run inside a caller-owned transaction"
    );

    let aggregate_type = data.aggregate_type();
    let aggregate_id = data.aggregate_id().to_string();
    let payload_json = serde_json::to_string(&data)?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) + 1 FROM events
         WHERE aggregate_type = ?1 AND aggregate_id = ?2",
        params![aggregate_type.as_str(), aggregate_id],
        |row| row.get(0),
    )?;

    let event = DomainEvent {
        id: new_id(),
        aggregate_type,
        aggregate_id,
        event_type: data.event_type(),
        payload: data,
        timestamp: now_timestamp(),
        version,
    };

    conn.execute(
        "INSERT INTO events (id, aggregate_type, aggregate_id, event_type, payload, timestamp, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.id,
            event.aggregate_type.as_str(),
            event.aggregate_id,
            event.event_type.as_str(),
            payload_json,
            event.timestamp,
            event.version,
        ],
    )?;

    tracing::debug!(
        event_id = %event.id,
        event_type = %event.event_type,
        aggregate_id = %event.aggregate_id,
        version = event.version,
        "event appended"
    );
    Ok(event)
}

/// Every event for one aggregate, ascending by version.
///
/// # Errors
///
/// Returns an error if the query fails or a stored event cannot be decoded.
pub fn events_for_aggregate(
    conn: &Connection,
    aggregate_type: AggregateType,
    aggregate_id: &str,
) -> Result<Vec<DomainEvent>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events
         WHERE aggregate_type = ?1 AND aggregate_id = ?2
         ORDER BY version ASC"
    );
    collect_events(conn, &sql, params![aggregate_type.as_str(), aggregate_id])
}

/// Events for one project strictly after `since`, ascending by timestamp with
/// ties broken by append order.
///
/// Covers the project's own events, events of every task created in it and
/// events of every comment on those tasks. Ownership is resolved from the
/// `TASK_CREATED` and `COMMENT_ADDED` payloads, so entities whose rows were
/// since deleted are still included.
///
/// # Errors
///
/// Returns an error if the query fails or a stored event cannot be decoded.
pub fn events_since(conn: &Connection, project_id: &str, since: &str) -> Result<Vec<DomainEvent>> {
    const SQL: &str = "
        WITH task_owner AS (
            SELECT aggregate_id AS task_id,
                   json_extract(payload, '$.projectId') AS project_id
            FROM events
            WHERE event_type = 'TASK_CREATED'
        ),
        comment_owner AS (
            SELECT aggregate_id AS comment_id,
                   json_extract(payload, '$.taskId') AS task_id
            FROM events
            WHERE event_type = 'COMMENT_ADDED'
        )
        SELECT e.id, e.aggregate_id, e.event_type, e.payload, e.timestamp, e.version
        FROM events e
        LEFT JOIN task_owner t
            ON e.aggregate_type = 'task' AND t.task_id = e.aggregate_id
        LEFT JOIN comment_owner c
            ON e.aggregate_type = 'comment' AND c.comment_id = e.aggregate_id
        LEFT JOIN task_owner ct
            ON ct.task_id = c.task_id
        WHERE e.timestamp > ?2
          AND (
                (e.aggregate_type = 'project' AND e.aggregate_id = ?1)
             OR (e.aggregate_type = 'task' AND t.project_id = ?1)
             OR (e.aggregate_type = 'comment' AND ct.project_id = ?1)
          )
        ORDER BY e.timestamp ASC, e.rowid ASC";

    collect_events(conn, SQL, params![project_id, since])
}

/// Every event in append order.
///
/// # Errors
///
/// Returns an error if the query fails or a stored event cannot be decoded.
pub fn all_events(conn: &Connection) -> Result<Vec<DomainEvent>> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY rowid ASC");
    collect_events(conn, &sql, [])
}

/// Number of events in the log.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn event_count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Project that a task was created in, read from its `TASK_CREATED` event.
///
/// Works for tasks whose materialized row has been deleted.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn creation_project_of_task(conn: &Connection, task_id: &str) -> Result<Option<String>> {
    let project_id = conn
        .query_row(
            "SELECT json_extract(payload, '$.projectId') FROM events
             WHERE event_type = 'TASK_CREATED' AND aggregate_id = ?1
             ORDER BY version ASC
             LIMIT 1",
            [task_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(project_id.flatten())
}

struct StoredEvent {
    id: String,
    aggregate_id: String,
    event_type: String,
    payload: String,
    timestamp: String,
    version: i64,
}

impl StoredEvent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            aggregate_id: row.get(1)?,
            event_type: row.get(2)?,
            payload: row.get(3)?,
            timestamp: row.get(4)?,
            version: row.get(5)?,
        })
    }

    fn decode(self) -> Result<DomainEvent> {
        DomainEvent::from_stored(
            self.id,
            self.aggregate_id,
            &self.event_type,
            &self.payload,
            self.timestamp,
            self.version,
        )
    }
}

fn collect_events(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<DomainEvent>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, StoredEvent::from_row)?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?.decode()?);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Store;
    use crate::event::EventType;
    use crate::event::data::{DeletedData, TaskUpdatedData};
    use crate::model::{Comment, Project, Task, TaskConfiguration, TaskPatch, TaskStatus};
    use crate::Error;

    fn project(id: &str) -> Project {
        Project {
            id: id.into(),
            name: id.into(),
            description: None,
            metadata: None,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
        }
    }

    fn task(id: &str, project_id: &str) -> Task {
        Task {
            id: id.into(),
            project_id: project_id.into(),
            title: id.into(),
            status: TaskStatus::Todo,
            assigned_to: vec![],
            configuration: TaskConfiguration::default(),
            dependencies: vec![],
            position: 0,
            created_at: now_timestamp(),
            updated_at: now_timestamp(),
            version: 1,
        }
    }

    fn comment(id: &str, task_id: &str) -> Comment {
        Comment {
            id: id.into(),
            task_id: task_id.into(),
            content: "hi".into(),
            author: "ana".into(),
            timestamp: now_timestamp(),
        }
    }

    fn append_all(store: &Store, events: Vec<EventData>) {
        store
            .transact(|conn| {
                for data in events {
                    append(conn, data)?;
                }
                Ok(())
            })
            .expect("append events");
    }

    #[test]
    fn versions_are_gap_free_per_aggregate() {
        let store = Store::open_in_memory().expect("open");
        let update = |status| {
            EventData::TaskUpdated(TaskUpdatedData {
                id: "t1".into(),
                patch: TaskPatch {
                    status: crate::model::Patch::Set(status),
                    ..TaskPatch::default()
                },
            })
        };
        append_all(
            &store,
            vec![
                EventData::TaskCreated(task("t1", "p1")),
                EventData::TaskCreated(task("t2", "p1")),
                update(TaskStatus::InProgress),
                update(TaskStatus::Done),
            ],
        );

        let events = store
            .read(|conn| events_for_aggregate(conn, AggregateType::Task, "t1"))
            .expect("read");
        let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(events[0].event_type, EventType::TaskCreated);

        let other = store
            .read(|conn| events_for_aggregate(conn, AggregateType::Task, "t2"))
            .expect("read");
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].version, 1);
    }

    #[test]
    fn unknown_aggregate_has_no_events() {
        let store = Store::open_in_memory().expect("open");
        let events = store
            .read(|conn| events_for_aggregate(conn, AggregateType::Project, "missing"))
            .expect("read");
        assert!(events.is_empty());
    }

    #[test]
    fn events_since_spans_project_tasks_and_comments() {
        let store = Store::open_in_memory().expect("open");
        append_all(
            &store,
            vec![
                EventData::ProjectCreated(project("p1")),
                EventData::ProjectCreated(project("p2")),
                EventData::TaskCreated(task("t1", "p1")),
                EventData::TaskCreated(task("t2", "p2")),
                EventData::CommentAdded(comment("c1", "t1")),
                EventData::CommentAdded(comment("c2", "t2")),
            ],
        );

        let events = store
            .read(|conn| events_since(conn, "p1", ""))
            .expect("read");
        let ids: Vec<&str> = events.iter().map(|e| e.aggregate_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "t1", "c1"]);
    }

    #[test]
    fn events_since_is_strictly_after() {
        let store = Store::open_in_memory().expect("open");
        append_all(&store, vec![EventData::ProjectCreated(project("p1"))]);

        let all = store.read(|conn| events_since(conn, "p1", "")).expect("read");
        assert_eq!(all.len(), 1);
        let cutoff = all[0].timestamp.clone();

        let after = store
            .read(|conn| events_since(conn, "p1", &cutoff))
            .expect("read");
        assert!(after.is_empty());
    }

    #[test]
    fn all_events_is_append_ordered() {
        let store = Store::open_in_memory().expect("open");
        append_all(
            &store,
            vec![
                EventData::ProjectCreated(project("p1")),
                EventData::ProjectDeleted(DeletedData { id: "p1".into() }),
            ],
        );
        let events = store.read(all_events).expect("read");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, EventType::ProjectDeleted);
        assert_eq!(events[1].version, 2);
        assert_eq!(store.read(event_count).expect("count"), 2);
    }

    #[test]
    fn creation_project_survives_missing_row() {
        let store = Store::open_in_memory().expect("open");
        append_all(&store, vec![EventData::TaskCreated(task("t1", "p9"))]);
        let owner = store
            .read(|conn| creation_project_of_task(conn, "t1"))
            .expect("read");
        assert_eq!(owner.as_deref(), Some("p9"));
        assert_eq!(
            store
                .read(|conn| creation_project_of_task(conn, "nope"))
                .expect("read"),
            None
        );
    }

    #[test]
    fn unknown_stored_event_type_fails_loudly() {
        let store = Store::open_in_memory().expect("open");
        store
            .transact(|conn| {
                conn.execute(
                    "INSERT INTO events (id, aggregate_type, aggregate_id, event_type, payload, timestamp, version)
                     VALUES ('e1', 'task', 't1', 'TASK_ARCHIVED', '{}', 't', 1)",
                    [],
                )?;
                Ok(())
            })
            .expect("insert raw");

        let err = store.read(all_events).expect_err("unknown type");
        assert!(matches!(err, Error::UnknownEventType(_)));
    }
}
