use std::collections::{BTreeSet, HashSet};

use rusqlite::Connection;

use crate::db::{Store, query};
use crate::event::data::{TaskDeletedData, TaskUpdatedData};
use crate::event::{AggregateType, EventData};
use crate::graph;
use crate::hub::BroadcastHub;
use crate::model::{NewTask, Task, TaskPatch, new_id, now_timestamp};
use crate::{Error, Result};

use super::{Committed, notification_for, record};

/// Task reads and mutations.
#[derive(Debug, Clone, Copy)]
pub struct TaskRepository<'a> {
    store: &'a Store,
    hub: &'a BroadcastHub,
}

impl<'a> TaskRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a Store, hub: &'a BroadcastHub) -> Self {
        Self { store, hub }
    }

    /// Create a task at the end of its project's board.
    ///
    /// Unset fields take defaults: status `todo`, priority `medium`, empty
    /// description, tags, custom fields, assignees and dependencies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for bad input, [`Error::NotFound`] if
    /// the project does not exist, [`Error::Cycle`] for a self-dependency,
    /// or a storage error.
    pub fn create(&self, input: NewTask) -> Result<Task> {
        input.validate()?;

        let id = new_id();
        if !self.store.read(|conn| query::project_exists(conn, &input.project_id))? {
            return Err(project_not_found(&input.project_id));
        }
        self.store.read(|conn| {
            ensure_acyclic(conn, &id, &input.project_id, &[], &input.dependencies)
        })?;

        let committed = self.store.transact(|conn| {
            if !query::project_exists(conn, &input.project_id)? {
                return Err(project_not_found(&input.project_id));
            }
            ensure_acyclic(conn, &id, &input.project_id, &[], &input.dependencies)?;

            let now = now_timestamp();
            let task = Task {
                id: id.clone(),
                project_id: input.project_id.clone(),
                title: input.title,
                status: input.status.unwrap_or_default(),
                assigned_to: input.assigned_to,
                configuration: input.configuration.applied_to(Default::default()),
                dependencies: input.dependencies,
                position: query::next_task_position(conn, &input.project_id)?,
                created_at: now.clone(),
                updated_at: now,
                version: 1,
            };

            let event = record(conn, &input.project_id, EventData::TaskCreated(task))?;
            let row = read_back(conn, &id)?;
            Ok(Committed {
                notification: notification_for(&event, &row.project_id, row.version)?,
                project_id: row.project_id.clone(),
                value: row,
            })
        })?;

        tracing::info!(
            task_id = %committed.value.id,
            project_id = %committed.project_id,
            position = committed.value.position,
            "task created"
        );
        Ok(committed.publish(self.hub))
    }

    /// # Errors
    ///
    /// Returns a storage error.
    pub fn find_by_id(&self, id: &str) -> Result<Option<Task>> {
        self.store.read(|conn| query::find_task(conn, id))
    }

    /// Tasks of a project ordered by position.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn find_by_project_id(&self, project_id: &str) -> Result<Vec<Task>> {
        self.store.read(|conn| query::tasks_for_project(conn, project_id))
    }

    /// Apply `patch` to a task. Returns `None` if the task does not exist.
    ///
    /// Only dependency ids not already present are cycle-checked; removals
    /// are always accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for bad input, [`Error::Cycle`] if an
    /// added dependency would close a cycle, or a storage error.
    pub fn update(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>> {
        patch.validate()?;

        let Some(current) = self.find_by_id(id)? else {
            return Ok(None);
        };
        if let Some(next) = patch.dependencies.as_set() {
            self.store.read(|conn| {
                ensure_acyclic(conn, id, &current.project_id, &current.dependencies, next)
            })?;
        }

        let committed = self.store.transact(|conn| {
            let Some(current) = query::find_task(conn, id)? else {
                return Ok(None);
            };
            // Re-check under the write lock against the committed task set.
            if let Some(next) = patch.dependencies.as_set() {
                ensure_acyclic(conn, id, &current.project_id, &current.dependencies, next)?;
            }

            let data = EventData::TaskUpdated(TaskUpdatedData {
                id: id.to_string(),
                patch,
            });
            let event = record(conn, &current.project_id, data)?;
            let row = read_back(conn, id)?;
            Ok(Some(Committed {
                notification: notification_for(&event, &row.project_id, row.version)?,
                project_id: row.project_id.clone(),
                value: row,
            }))
        })?;

        Ok(committed.map(|committed| {
            tracing::info!(task_id = %id, version = committed.value.version, "task updated");
            committed.publish(self.hub)
        }))
    }

    /// Delete a task row. Its comments, and dependency references to it from
    /// other tasks, are left in place. Returns `false` if the task does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let committed = self.store.transact(|conn| {
            let Some(project_id) = query::task_project_id(conn, id)? else {
                return Ok(None);
            };

            let data = EventData::TaskDeleted(TaskDeletedData {
                id: id.to_string(),
                project_id: project_id.clone(),
            });
            let event = record(conn, &project_id, data)?;
            Ok(Some(Committed {
                notification: notification_for(&event, &project_id, event.version)?,
                project_id,
                value: (),
            }))
        })?;

        Ok(committed.is_some_and(|committed| {
            tracing::info!(task_id = %id, "task deleted");
            committed.publish(self.hub);
            true
        }))
    }

    /// Ids that may not be offered as new dependencies of `task_id`: the
    /// task itself plus every task of its project that would close a cycle.
    /// Returns `None` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn invalid_dependencies(&self, task_id: &str) -> Result<Option<BTreeSet<String>>> {
        self.store.read(|conn| {
            let Some(project_id) = query::task_project_id(conn, task_id)? else {
                return Ok(None);
            };
            let tasks = query::tasks_for_project(conn, &project_id)?;
            Ok(Some(graph::invalid_dependencies(task_id, &tasks)))
        })
    }

    /// The dependencies of `task_id` that still exist, in list order. Stale
    /// ids are skipped. Returns `None` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn live_dependencies(&self, task_id: &str) -> Result<Option<Vec<Task>>> {
        self.store.read(|conn| {
            let Some(task) = query::find_task(conn, task_id)? else {
                return Ok(None);
            };
            let mut seen = HashSet::new();
            let mut live = Vec::new();
            for dep in &task.dependencies {
                if !seen.insert(dep.as_str()) {
                    continue;
                }
                if let Some(dep_task) = query::find_task(conn, dep)? {
                    live.push(dep_task);
                }
            }
            Ok(Some(live))
        })
    }
}

/// Cycle-check a dependency change of `task_id` against the current task set
/// of `project_id`.
///
/// Added ids must not name a live task of another project: the graph only
/// spans one project. Ids with no row are stale and tolerated.
fn ensure_acyclic(
    conn: &Connection,
    task_id: &str,
    project_id: &str,
    current: &[String],
    next: &[String],
) -> Result<()> {
    if next.iter().all(|dep| current.contains(dep)) {
        return Ok(());
    }
    for dep in next.iter().filter(|dep| !current.contains(dep)) {
        let Some(owner) = query::task_project_id(conn, dep)? else {
            continue;
        };
        if owner != project_id {
            return Err(Error::validation(
                "dependencies",
                format!("task '{dep}' belongs to another project"),
            ));
        }
    }
    let tasks = query::tasks_for_project(conn, project_id)?;
    graph::check_dependency_change(task_id, current, next, &tasks)?;
    Ok(())
}

fn project_not_found(project_id: &str) -> Error {
    Error::NotFound {
        kind: AggregateType::Project,
        id: project_id.to_string(),
    }
}

fn read_back(conn: &Connection, id: &str) -> Result<Task> {
    query::find_task(conn, id)?.ok_or_else(|| Error::NotFound {
        kind: AggregateType::Task,
        id: id.to_string(),
    })
}
