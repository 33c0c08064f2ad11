//! Catch-up reads (`tw sync`, `tw feed`), per-aggregate history rendering,
//! and `tw rebuild`.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use taskweave_core::db::change_feed::ChangeFeedEntry;
use taskweave_core::event::DomainEvent;

use super::Invocation;
use crate::output::{OutputMode, pretty_kv, pretty_section, render, render_mode};

#[derive(Args, Debug)]
pub struct SyncArgs {
    pub project_id: String,

    /// Only events strictly after this timestamp. Omit for the full history.
    #[arg(long, default_value = "")]
    pub since: String,
}

#[derive(Args, Debug)]
pub struct FeedArgs {
    pub project_id: String,

    /// Only entries strictly after this timestamp. Omit for the full feed.
    #[arg(long, default_value = "")]
    pub since: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RebuildOutput {
    ok: bool,
    event_count: usize,
    project_count: usize,
    task_count: usize,
    comment_count: usize,
    elapsed_ms: u64,
}

pub fn run_sync(args: &SyncArgs, ctx: &Invocation) -> Result<()> {
    let events =
        ctx.with_tracker(|tracker| Ok(tracker.events_since(&args.project_id, &args.since)?))?;
    render_events(
        ctx.output,
        &events,
        &format!("Events for project {}", args.project_id),
    )
}

pub fn run_feed(args: &FeedArgs, ctx: &Invocation) -> Result<()> {
    let entries =
        ctx.with_tracker(|tracker| Ok(tracker.change_feed_since(&args.project_id, &args.since)?))?;
    render_mode(
        ctx.output,
        &entries,
        |entries, w| {
            for e in entries {
                write_feed_row(e, w)?;
            }
            Ok(())
        },
        |entries, w| {
            pretty_section(w, &format!("Change feed for {} ({})", args.project_id, entries.len()))?;
            for e in entries {
                write_feed_row(e, w)?;
            }
            Ok(())
        },
    )
}

pub fn run_rebuild(ctx: &Invocation) -> Result<()> {
    let report = ctx.with_tracker(|tracker| Ok(tracker.rebuild()?))?;
    let out = RebuildOutput {
        ok: true,
        event_count: report.event_count,
        project_count: report.project_count,
        task_count: report.task_count,
        comment_count: report.comment_count,
        elapsed_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
    };
    render(ctx.output, &out, |o, w| {
        pretty_kv(w, "events", o.event_count.to_string())?;
        pretty_kv(w, "projects", o.project_count.to_string())?;
        pretty_kv(w, "tasks", o.task_count.to_string())?;
        pretty_kv(w, "comments", o.comment_count.to_string())?;
        pretty_kv(w, "elapsed", format!("{}ms", o.elapsed_ms))
    })
}

/// Render a list of events: one row each in text mode, a titled section in
/// pretty mode, the full events (payload included) in JSON.
pub fn render_events(mode: OutputMode, events: &[DomainEvent], heading: &str) -> Result<()> {
    render_mode(
        mode,
        events,
        |events, w| {
            for e in events {
                write_event_row(e, w)?;
            }
            Ok(())
        },
        |events, w| {
            pretty_section(w, &format!("{heading} ({})", events.len()))?;
            for e in events {
                write_event_row(e, w)?;
            }
            Ok(())
        },
    )
}

fn write_event_row(event: &DomainEvent, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\tv{}\t{}",
        event.timestamp, event.event_type, event.aggregate_type, event.version, event.aggregate_id
    )
}

fn write_feed_row(entry: &ChangeFeedEntry, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}",
        entry.timestamp, entry.change_type, entry.entity_type, entry.entity_id
    )
}
