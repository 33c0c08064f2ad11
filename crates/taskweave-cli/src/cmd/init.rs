use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use taskweave_core::config::{self, EngineConfig, TRACKER_DIR};
use taskweave_core::db::{Store, event_store};

use super::Invocation;
use crate::output::{pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite `.taskweave/config.toml` even if the directory already exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    config: PathBuf,
    db: PathBuf,
    /// Events already in the log (non-zero after `--force` on a used store).
    events: usize,
}

/// Execute `tw init`. Creates:
///
/// ```text
/// .taskweave/
///   config.toml   (engine defaults)
///   tracker.db    (schema created, empty)
/// ```
///
/// # Errors
///
/// Returns an error if `.taskweave/` already exists without `--force`, or a
/// filesystem or storage step fails.
pub fn run_init(args: &InitArgs, ctx: &Invocation) -> Result<()> {
    let tracker_dir = ctx.project_root.join(TRACKER_DIR);
    if tracker_dir.exists() && !args.force {
        anyhow::bail!("{TRACKER_DIR}/ already exists. Use `tw init --force` to reinitialize.");
    }

    let config_path = config::write_engine_config(&ctx.project_root, &EngineConfig::default())?;
    let engine = ctx.engine_config()?;
    let db = engine.db_path(&ctx.project_root);

    let store = Store::open(&db, engine.store.busy_timeout())?;
    let events = store
        .read(event_store::event_count)
        .context("read store status")?;
    store.close().context("close store")?;

    tracing::info!(root = %ctx.project_root.display(), "tracker initialized");
    let out = InitOutput {
        ok: true,
        config: config_path,
        db,
        events,
    };
    render(ctx.output, &out, |o, w| {
        pretty_kv(w, "initialized", o.config.display().to_string())?;
        pretty_kv(w, "database", o.db.display().to_string())?;
        pretty_kv(w, "events", o.events.to_string())
    })
}
