use crate::db::{Store, query};
use crate::event::data::{DeletedData, ProjectUpdatedData};
use crate::event::{AggregateType, EventData};
use crate::hub::BroadcastHub;
use crate::model::{NewProject, Project, ProjectPatch, new_id, now_timestamp};
use crate::{Error, Result};

use super::{Committed, notification_for, record};

/// Project reads and mutations.
#[derive(Debug, Clone, Copy)]
pub struct ProjectRepository<'a> {
    store: &'a Store,
    hub: &'a BroadcastHub,
}

impl<'a> ProjectRepository<'a> {
    #[must_use]
    pub const fn new(store: &'a Store, hub: &'a BroadcastHub) -> Self {
        Self { store, hub }
    }

    /// Create a project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank name, or a storage error.
    pub fn create(&self, input: NewProject) -> Result<Project> {
        input.validate()?;

        let now = now_timestamp();
        let project = Project {
            id: new_id(),
            name: input.name,
            description: input.description,
            metadata: input.metadata,
            created_at: now.clone(),
            updated_at: now,
        };

        let committed = self.store.transact(|conn| {
            let event = record(conn, &project.id, EventData::ProjectCreated(project.clone()))?;
            let row = read_back(conn, &project.id)?;
            Ok(Committed {
                notification: notification_for(&event, &row.id, event.version)?,
                project_id: row.id.clone(),
                value: row,
            })
        })?;

        tracing::info!(project_id = %committed.value.id, "project created");
        Ok(committed.publish(self.hub))
    }

    /// # Errors
    ///
    /// Returns a storage error.
    pub fn find_by_id(&self, id: &str) -> Result<Option<Project>> {
        self.store.read(|conn| query::find_project(conn, id))
    }

    /// All projects, newest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn find_all(&self) -> Result<Vec<Project>> {
        self.store.read(query::list_projects)
    }

    /// Apply `patch` to a project. Returns `None` if the project does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank replacement name, or a
    /// storage error.
    pub fn update(&self, id: &str, patch: ProjectPatch) -> Result<Option<Project>> {
        patch.validate()?;

        let committed = self.store.transact(|conn| {
            if !query::project_exists(conn, id)? {
                return Ok(None);
            }

            let data = EventData::ProjectUpdated(ProjectUpdatedData {
                id: id.to_string(),
                patch,
                updated_at: now_timestamp(),
            });
            let event = record(conn, id, data)?;
            let row = read_back(conn, id)?;
            Ok(Some(Committed {
                notification: notification_for(&event, id, event.version)?,
                project_id: id.to_string(),
                value: row,
            }))
        })?;

        Ok(committed.map(|committed| {
            tracing::info!(project_id = %id, "project updated");
            committed.publish(self.hub)
        }))
    }

    /// Delete a project row. Its tasks and comments are left in place.
    /// Returns `false` if the project does not exist.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let committed = self.store.transact(|conn| {
            if !query::project_exists(conn, id)? {
                return Ok(None);
            }

            let data = EventData::ProjectDeleted(DeletedData { id: id.to_string() });
            let event = record(conn, id, data)?;
            Ok(Some(Committed {
                notification: notification_for(&event, id, event.version)?,
                project_id: id.to_string(),
                value: (),
            }))
        })?;

        Ok(committed.is_some_and(|committed| {
            tracing::info!(project_id = %id, "project deleted");
            committed.publish(self.hub);
            true
        }))
    }

    /// Number of tasks currently materialized for the project.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn task_count(&self, id: &str) -> Result<usize> {
        self.store.read(|conn| query::task_count(conn, id))
    }
}

fn read_back(conn: &rusqlite::Connection, id: &str) -> Result<Project> {
    query::find_project(conn, id)?.ok_or_else(|| Error::NotFound {
        kind: AggregateType::Project,
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::event_store;
    use crate::event::EventType;
    use crate::model::Patch;
    use serde_json::{Map, json};

    fn setup() -> (Store, BroadcastHub) {
        (Store::open_in_memory().expect("open"), BroadcastHub::new())
    }

    #[test]
    fn create_round_trips_and_appends_one_event() {
        let (store, hub) = setup();
        let repo = ProjectRepository::new(&store, &hub);

        let mut metadata = Map::new();
        metadata.insert("team".into(), json!("core"));
        let created = repo
            .create(NewProject {
                name: "Roadmap".into(),
                description: Some("2025".into()),
                metadata: Some(metadata),
            })
            .expect("create");

        assert_eq!(repo.find_by_id(&created.id).expect("find"), Some(created.clone()));

        let events = store
            .read(|conn| event_store::events_for_aggregate(conn, AggregateType::Project, &created.id))
            .expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ProjectCreated);
    }

    #[test]
    fn blank_name_never_reaches_the_event_log() {
        let (store, hub) = setup();
        let repo = ProjectRepository::new(&store, &hub);
        let err = repo.create(NewProject::named("  ")).expect_err("blank");
        assert!(matches!(err, Error::Validation { field: "name", .. }));
        assert!(store.read(event_store::all_events).expect("events").is_empty());
    }

    #[test]
    fn update_patches_fields_and_missing_is_none() {
        let (store, hub) = setup();
        let repo = ProjectRepository::new(&store, &hub);
        let created = repo.create(NewProject::named("Roadmap")).expect("create");

        let updated = repo
            .update(
                &created.id,
                ProjectPatch {
                    description: Patch::Set(Some(String::new())),
                    ..ProjectPatch::default()
                },
            )
            .expect("update")
            .expect("exists");
        assert_eq!(updated.name, "Roadmap");
        assert_eq!(updated.description.as_deref(), Some(""));

        assert!(repo.update("missing", ProjectPatch::default()).expect("update").is_none());
    }

    #[test]
    fn find_all_is_newest_first() {
        let (store, hub) = setup();
        let repo = ProjectRepository::new(&store, &hub);
        let first = repo.create(NewProject::named("a")).expect("create");
        let second = repo.create(NewProject::named("b")).expect("create");

        let ids: Vec<String> = repo.find_all().expect("list").into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn delete_reports_presence() {
        let (store, hub) = setup();
        let repo = ProjectRepository::new(&store, &hub);
        let created = repo.create(NewProject::named("a")).expect("create");

        assert!(repo.delete(&created.id).expect("delete"));
        assert!(!repo.delete(&created.id).expect("delete again"));
        assert!(repo.find_by_id(&created.id).expect("find").is_none());

        let versions: Vec<i64> = store
            .read(|conn| event_store::events_for_aggregate(conn, AggregateType::Project, &created.id))
            .expect("events")
            .iter()
            .map(|e| e.version)
            .collect();
        assert_eq!(versions, vec![1, 2]);
    }
}
