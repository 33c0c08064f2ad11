use rusqlite::Connection;

use crate::db::{Store, event_store, query};
use crate::event::data::CommentDeletedData;
use crate::event::{AggregateType, EventData};
use crate::hub::BroadcastHub;
use crate::model::{Comment, NewComment, new_id, now_timestamp};
use crate::{Error, Result};

use super::{Committed, notification_for, record};

/// Comment reads and mutations. Comments have no update operation.
#[derive(Debug, Clone, Copy)]
pub struct CommentRepository<'a> {
    store: &'a Store,
    hub: &'a BroadcastHub,
}

impl<'a> CommentRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a Store, hub: &'a BroadcastHub) -> Self {
        Self { store, hub }
    }

    /// Add a comment to an existing task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for bad input, [`Error::NotFound`] if
    /// the task does not exist, or a storage error.
    pub fn create(&self, input: NewComment) -> Result<Comment> {
        input.validate()?;

        let committed = self.store.transact(|conn| {
            let Some(project_id) = query::task_project_id(conn, &input.task_id)? else {
                return Err(task_not_found(&input.task_id));
            };

            let comment = Comment {
                id: new_id(),
                task_id: input.task_id,
                content: input.content,
                author: input.author,
                timestamp: now_timestamp(),
            };
            let id = comment.id.clone();
            let event = record(conn, &project_id, EventData::CommentAdded(comment))?;
            let row = read_back(conn, &id)?;
            Ok(Committed {
                notification: notification_for(&event, &project_id, event.version)?,
                project_id,
                value: row,
            })
        })?;

        tracing::info!(
            comment_id = %committed.value.id,
            task_id = %committed.value.task_id,
            "comment added"
        );
        Ok(committed.publish(self.hub))
    }

    /// # Errors
    ///
    /// Returns a storage error.
    pub fn find_by_id(&self, id: &str) -> Result<Option<Comment>> {
        self.store.read(|conn| query::find_comment(conn, id))
    }

    /// Comments on a task, oldest first. Comments on deleted tasks are still
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn find_by_task_id(&self, task_id: &str) -> Result<Vec<Comment>> {
        self.store.read(|conn| query::comments_for_task(conn, task_id))
    }

    /// Delete a comment. Returns `false` if it does not exist.
    ///
    /// The owning project is taken from the task row, or from the task's
    /// creation event when the task row is already gone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the owning task was never created, or a
    /// storage error.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let committed = self.store.transact(|conn| {
            let Some(comment) = query::find_comment(conn, id)? else {
                return Ok(None);
            };
            let project_id = owning_project(conn, &comment.task_id)?;

            let data = EventData::CommentDeleted(CommentDeletedData {
                id: id.to_string(),
                task_id: comment.task_id,
            });
            let event = record(conn, &project_id, data)?;
            Ok(Some(Committed {
                notification: notification_for(&event, &project_id, event.version)?,
                project_id,
                value: (),
            }))
        })?;

        Ok(committed.is_some_and(|committed| {
            tracing::info!(comment_id = %id, "comment deleted");
            committed.publish(self.hub);
            true
        }))
    }
}

fn owning_project(conn: &Connection, task_id: &str) -> Result<String> {
    if let Some(project_id) = query::task_project_id(conn, task_id)? {
        return Ok(project_id);
    }
    event_store::creation_project_of_task(conn, task_id)?.ok_or_else(|| task_not_found(task_id))
}

fn task_not_found(task_id: &str) -> Error {
    Error::NotFound {
        kind: AggregateType::Task,
        id: task_id.to_string(),
    }
}

fn read_back(conn: &Connection, id: &str) -> Result<Comment> {
    query::find_comment(conn, id)?.ok_or_else(|| Error::NotFound {
        kind: AggregateType::Comment,
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::change_feed::{self, ChangeType};
    use crate::model::{NewProject, NewTask};
    use crate::repo::{ProjectRepository, TaskRepository};

    fn setup() -> (Store, BroadcastHub, String, String) {
        let store = Store::open_in_memory().expect("open");
        let hub = BroadcastHub::new();
        let project = ProjectRepository::new(&store, &hub)
            .create(NewProject::named("Roadmap"))
            .expect("project");
        let task = TaskRepository::new(&store, &hub)
            .create(NewTask::new(&project.id, "Design"))
            .expect("task");
        (store, hub, project.id, task.id)
    }

    #[test]
    fn comments_are_listed_oldest_first() {
        let (store, hub, _, task_id) = setup();
        let repo = CommentRepository::new(&store, &hub);
        let first = repo.create(NewComment::new(&task_id, "one", "ana")).expect("c1");
        let second = repo.create(NewComment::new(&task_id, "two", "bo")).expect("c2");

        let listed = repo.find_by_task_id(&task_id).expect("list");
        assert_eq!(listed, vec![first, second]);
    }

    #[test]
    fn comment_on_missing_task_is_not_found() {
        let (store, hub, _, _) = setup();
        let repo = CommentRepository::new(&store, &hub);
        let err = repo
            .create(NewComment::new("ghost", "hi", "ana"))
            .expect_err("missing task");
        assert!(matches!(err, Error::NotFound { kind: AggregateType::Task, .. }));
    }

    #[test]
    fn delete_after_task_deletion_uses_creation_project() {
        let (store, hub, project_id, task_id) = setup();
        let comments = CommentRepository::new(&store, &hub);
        let comment = comments
            .create(NewComment::new(&task_id, "orphan soon", "ana"))
            .expect("comment");

        assert!(TaskRepository::new(&store, &hub).delete(&task_id).expect("delete task"));
        assert!(comments.delete(&comment.id).expect("delete comment"));
        assert!(!comments.delete(&comment.id).expect("second delete"));

        let feed = store
            .read(|conn| change_feed::entries_since(conn, &project_id, ""))
            .expect("feed");
        let last = feed.last().expect("entries");
        assert_eq!(last.entity_id, comment.id);
        assert_eq!(last.change_type, ChangeType::Deleted);
    }
}
