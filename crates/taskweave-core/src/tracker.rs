//! Process-scoped service owning the store and the broadcast hub.

use std::path::Path;

use anyhow::Context as _;

use crate::Result;
use crate::config::EngineConfig;
use crate::db::change_feed::{self, ChangeFeedEntry};
use crate::db::rebuild::{self, RebuildReport};
use crate::db::{Store, event_store};
use crate::event::{AggregateType, DomainEvent};
use crate::hub::{BroadcastError, BroadcastHub, HeartbeatHandle, Subscription};
use crate::repo::{CommentRepository, ProjectRepository, TaskRepository};

/// One tracker instance: storage handle, subscriber registry, heartbeat.
///
/// Repositories are cheap views borrowing the tracker. Several trackers can
/// coexist in one process (each with its own store and hub).
#[derive(Debug)]
pub struct Tracker {
    store: Store,
    hub: BroadcastHub,
    heartbeat: Option<HeartbeatHandle>,
    subscriber_buffer: usize,
}

impl Tracker {
    /// Open the store under `project_root` as described by `config` and start
    /// the heartbeat (unless disabled).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, its schema cannot be
    /// created, or the heartbeat thread cannot be spawned.
    pub fn open(project_root: &Path, config: &EngineConfig) -> anyhow::Result<Self> {
        let db_path = config.db_path(project_root);
        let store = Store::open(&db_path, config.store.busy_timeout())?;
        let hub = BroadcastHub::new();
        let heartbeat = config
            .realtime
            .heartbeat_interval()
            .map(|interval| hub.start_heartbeat(interval))
            .transpose()
            .context("start heartbeat")?;

        tracing::info!(db = %db_path.display(), "tracker opened");
        Ok(Self {
            store,
            hub,
            heartbeat,
            subscriber_buffer: config.realtime.subscriber_buffer,
        })
    }

    /// Private in-memory tracker without a heartbeat thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory store cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Store::open_in_memory()?,
            hub: BroadcastHub::new(),
            heartbeat: None,
            subscriber_buffer: EngineConfig::default().realtime.subscriber_buffer,
        })
    }

    #[must_use]
    pub const fn projects(&self) -> ProjectRepository<'_> {
        ProjectRepository::new(&self.store, &self.hub)
    }

    #[must_use]
    pub const fn tasks(&self) -> TaskRepository<'_> {
        TaskRepository::new(&self.store, &self.hub)
    }

    #[must_use]
    pub const fn comments(&self) -> CommentRepository<'_> {
        CommentRepository::new(&self.store, &self.hub)
    }

    #[must_use]
    pub const fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Subscribe to a project's notifications over a bounded channel sized by
    /// `realtime.subscriber_buffer`.
    ///
    /// # Errors
    ///
    /// Returns a [`BroadcastError`] if the hub is shut down.
    pub fn subscribe(&self, project_id: &str) -> Result<Subscription, BroadcastError> {
        self.hub.connect(project_id, self.subscriber_buffer)
    }

    /// # Errors
    ///
    /// Returns a storage or decode error.
    pub fn events_for_aggregate(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<Vec<DomainEvent>> {
        self.store
            .read(|conn| event_store::events_for_aggregate(conn, aggregate_type, aggregate_id))
    }

    /// Catch-up query for a subscriber that missed live frames.
    ///
    /// # Errors
    ///
    /// Returns a storage or decode error.
    pub fn events_since(&self, project_id: &str, since: &str) -> Result<Vec<DomainEvent>> {
        self.store
            .read(|conn| event_store::events_since(conn, project_id, since))
    }

    /// # Errors
    ///
    /// Returns a storage or decode error.
    pub fn all_events(&self) -> Result<Vec<DomainEvent>> {
        self.store.read(event_store::all_events)
    }

    /// # Errors
    ///
    /// Returns a storage or decode error.
    pub fn change_feed_since(&self, project_id: &str, since: &str) -> Result<Vec<ChangeFeedEntry>> {
        self.store
            .read(|conn| change_feed::entries_since(conn, project_id, since))
    }

    /// Replay the event log into fresh materialized tables.
    ///
    /// # Errors
    ///
    /// Returns an error if any event cannot be decoded or projected.
    pub fn rebuild(&self) -> Result<RebuildReport> {
        rebuild::rebuild(&self.store)
    }

    /// Stop the heartbeat, drop every subscriber and close the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses to close.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        self.hub.shutdown().context("shut down broadcast hub")?;
        self.store.close().context("close store")?;
        tracing::info!("tracker shut down");
        Ok(())
    }
}
