//! Repositories: the only entry points that mutate the event log.
//!
//! Every mutation follows the same sequence:
//!
//! 1. validate input (no transaction yet)
//! 2. for dependency changes, run the cycle check (no transaction yet)
//! 3. in one immediate transaction: append the event, project it, append the
//!    change-feed row, read back the materialized row
//! 4. after commit, publish a notification to the project's subscribers
//!
//! Broadcast failures are logged and never change the mutation's outcome.

pub mod comment;
pub mod project;
pub mod task;

pub use comment::CommentRepository;
pub use project::ProjectRepository;
pub use task::TaskRepository;

use rusqlite::Connection;

use crate::Result;
use crate::db::change_feed::ChangeType;
use crate::db::event_store;
use crate::db::project::Projector;
use crate::event::{DomainEvent, EventData};
use crate::hub::{BroadcastHub, Notification};

/// Append `data`, project it and record one change-feed row for
/// `project_id`. Must run inside the caller's transaction.
fn record(conn: &Connection, project_id: &str, data: EventData) -> Result<DomainEvent> {
    let event = event_store::append(conn, data)?;
    let projector = Projector::new(conn);
    projector.project(&event)?;

    let delta = event.payload.to_json_value()?;
    projector.add_to_change_feed(
        project_id,
        ChangeType::for_event(event.event_type),
        event.aggregate_type,
        &event.aggregate_id,
        &delta,
    )?;
    Ok(event)
}

/// Notification for a committed event. The delta mirrors the event payload;
/// deletions carry none.
fn notification_for(event: &DomainEvent, project_id: &str, version: i64) -> Result<Notification> {
    let notification =
        Notification::for_event(event.event_type, project_id, &event.aggregate_id, &event.timestamp)
            .with_version(version);
    if ChangeType::for_event(event.event_type) == ChangeType::Deleted {
        return Ok(notification);
    }
    Ok(notification.with_delta(event.payload.to_json_value()?))
}

/// Publish after commit. Failures are logged only.
fn publish_committed(hub: &BroadcastHub, project_id: &str, notification: &Notification) {
    match hub.publish(project_id, notification) {
        Ok(delivered) => tracing::debug!(
            %project_id,
            kind = ?notification.kind,
            entity_id = %notification.entity_id,
            delivered,
            "notification published"
        ),
        Err(err) => tracing::warn!(
            %project_id,
            entity_id = %notification.entity_id,
            error = %err,
            "notification not published"
        ),
    }
}

/// Commit-side result handed from the transaction to the publisher.
struct Committed<T> {
    value: T,
    project_id: String,
    notification: Notification,
}

impl<T> Committed<T> {
    fn publish(self, hub: &BroadcastHub) -> T {
        publish_committed(hub, &self.project_id, &self.notification);
        self.value
    }
}
