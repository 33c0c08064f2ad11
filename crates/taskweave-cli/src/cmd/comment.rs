//! `tw comment`: append to and inspect a task's comment timeline.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::Write;
use taskweave_core::event::AggregateType;
use taskweave_core::model::NewComment;

use super::{Invocation, not_found};
use crate::output::{pretty_kv, pretty_section, render, render_mode};

#[derive(Args, Debug)]
pub struct CommentArgs {
    #[command(subcommand)]
    pub command: CommentCommand,
}

#[derive(Subcommand, Debug)]
pub enum CommentCommand {
    #[command(
        about = "Add a comment to a task",
        after_help = "EXAMPLES:\n    # Add a progress note\n    tw comment add <T> \"Investigating timeout path\" --author ana"
    )]
    Add(AddArgs),

    /// List a task's comments, oldest first.
    List(TaskIdArg),

    /// Delete a comment.
    Delete(CommentIdArg),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub task_id: String,

    pub content: String,

    #[arg(long)]
    pub author: String,
}

#[derive(Args, Debug)]
pub struct TaskIdArg {
    pub task_id: String,
}

#[derive(Args, Debug)]
pub struct CommentIdArg {
    pub id: String,
}

#[derive(Debug, Serialize)]
struct DeleteOutput {
    ok: bool,
    id: String,
}

pub fn run_comment(args: &CommentArgs, ctx: &Invocation) -> Result<()> {
    match &args.command {
        CommentCommand::Add(add) => run_add(add, ctx),
        CommentCommand::List(TaskIdArg { task_id }) => run_list(task_id, ctx),
        CommentCommand::Delete(CommentIdArg { id }) => run_delete(id, ctx),
    }
}

fn run_add(args: &AddArgs, ctx: &Invocation) -> Result<()> {
    let input = NewComment::new(&args.task_id, &args.content, &args.author);
    let comment = ctx.with_tracker(|tracker| Ok(tracker.comments().create(input)?))?;
    render(ctx.output, &comment, |c, w| {
        pretty_kv(w, "id", &c.id)?;
        pretty_kv(w, "task", &c.task_id)?;
        pretty_kv(w, "author", &c.author)?;
        pretty_kv(w, "at", &c.timestamp)
    })
}

fn run_list(task_id: &str, ctx: &Invocation) -> Result<()> {
    let comments = ctx.with_tracker(|tracker| Ok(tracker.comments().find_by_task_id(task_id)?))?;
    render_mode(
        ctx.output,
        &comments,
        |comments, w| {
            for c in comments {
                writeln!(w, "{}\t{}\t{}\t{}", c.id, c.timestamp, c.author, c.content)?;
            }
            Ok(())
        },
        |comments, w| {
            pretty_section(w, &format!("Comments ({})", comments.len()))?;
            for c in comments {
                writeln!(w, "[{}] {} ({})", c.timestamp, c.author, c.id)?;
                writeln!(w, "    {}", c.content)?;
            }
            Ok(())
        },
    )
}

fn run_delete(id: &str, ctx: &Invocation) -> Result<()> {
    if !ctx.with_tracker(|tracker| Ok(tracker.comments().delete(id)?))? {
        return Err(not_found(AggregateType::Comment, id));
    }
    render(
        ctx.output,
        &DeleteOutput {
            ok: true,
            id: id.to_string(),
        },
        |o, w| writeln!(w, "deleted comment {}", o.id),
    )
}
