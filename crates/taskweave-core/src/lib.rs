//! taskweave-core library.
//!
//! Every mutation of a project, task, or comment is appended to an immutable,
//! per-aggregate versioned event log. A [`db::project::Projector`] folds each
//! event into materialized tables inside the same transaction, a change feed
//! records project-scoped deltas for catch-up, and the
//! [`hub::BroadcastHub`] pushes committed changes to live subscribers.
//!
//! # Conventions
//!
//! - **Errors**: Use [`Result`] (alias over [`Error`]) in the engine and
//!   `anyhow::Result` at configuration and CLI edges.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod graph;
pub mod hub;
pub mod model;
pub mod repo;
pub mod tracker;

pub use error::{Error, ErrorCode, Result};
pub use tracker::Tracker;
