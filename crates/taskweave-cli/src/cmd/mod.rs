pub mod comment;
pub mod completions;
pub mod events;
pub mod init;
pub mod project;
pub mod task;

use anyhow::Context as _;
use std::path::PathBuf;
use taskweave_core::Tracker;
use taskweave_core::config::{self, EngineConfig, TRACKER_DIR};

use crate::output::OutputMode;

/// Per-invocation settings shared by every command.
#[derive(Debug)]
pub struct Invocation {
    pub project_root: PathBuf,
    pub db: Option<PathBuf>,
    pub output: OutputMode,
}

impl Invocation {
    /// Engine config for this invocation, with `--db` applied.
    ///
    /// One-shot commands hold no live subscribers, so the heartbeat thread is
    /// disabled.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut engine = config::load_engine_config(&self.project_root)?;
        if let Some(ref db) = self.db {
            engine.store.path.clone_from(db);
        }
        engine.realtime.heartbeat_secs = 0;
        Ok(engine)
    }

    /// Open the tracker, run `f`, then shut the tracker down.
    pub fn with_tracker<T>(&self, f: impl FnOnce(&Tracker) -> anyhow::Result<T>) -> anyhow::Result<T> {
        if self.db.is_none() && !self.project_root.join(TRACKER_DIR).is_dir() {
            let code = taskweave_core::ErrorCode::NotInitialized;
            anyhow::bail!(
                "{} in {}. {}",
                code.message(),
                self.project_root.display(),
                code.hint().unwrap_or_default()
            );
        }

        let engine = self.engine_config()?;
        let tracker = Tracker::open(&self.project_root, &engine).context("open tracker")?;
        let result = f(&tracker);
        tracker.shutdown()?;
        result
    }
}

/// Parse a JSON object argument such as `--metadata '{"team":"core"}'`.
pub fn parse_json_object(
    raw: &str,
) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str(raw).with_context(|| format!("invalid JSON: {raw}"))? {
        serde_json::Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, got {other}"),
    }
}

/// Absent-id error with the same code the engine uses for missing parents.
pub fn not_found(kind: taskweave_core::event::AggregateType, id: &str) -> anyhow::Error {
    taskweave_core::Error::NotFound {
        kind,
        id: id.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_object_accepts_objects_only() {
        let map = parse_json_object(r#"{"team":"core"}"#).expect("object");
        assert_eq!(map["team"], "core");
        assert!(parse_json_object("[1,2]").is_err());
        assert!(parse_json_object("{").is_err());
    }

    #[test]
    fn uninitialized_directory_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let invocation = Invocation {
            project_root: dir.path().to_path_buf(),
            db: None,
            output: OutputMode::Json,
        };
        let err = invocation.with_tracker(|_| Ok(())).expect_err("not initialized");
        assert!(err.to_string().contains("tw init"));
    }

    #[test]
    fn db_override_skips_init_check_and_disables_heartbeat() {
        let dir = tempfile::tempdir().expect("temp dir");
        let invocation = Invocation {
            project_root: dir.path().to_path_buf(),
            db: Some(dir.path().join("custom.db")),
            output: OutputMode::Json,
        };
        assert!(invocation.engine_config().expect("config").realtime.heartbeat_interval().is_none());
        let count = invocation
            .with_tracker(|tracker| Ok(tracker.projects().find_all()?.len()))
            .expect("open");
        assert_eq!(count, 0);
        assert!(dir.path().join("custom.db").exists());
    }
}
