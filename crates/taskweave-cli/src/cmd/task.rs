//! `tw task`: create, inspect, update, and delete tasks.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{self, Write};
use taskweave_core::event::{AggregateType, DomainEvent};
use taskweave_core::model::{
    Comment, NewTask, Patch, Priority, Task, TaskConfigurationPatch, TaskPatch, TaskStatus,
};

use super::{Invocation, not_found, parse_json_object};
use crate::cmd::events::render_events;
use crate::output::{pretty_kv, pretty_section, render, render_mode};

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// Create a task in a project.
    Create(CreateArgs),
    /// List a project's tasks by board position.
    List(ListArgs),
    /// Show one task with its comments and stale dependencies.
    Show(IdArg),
    /// Change fields of a task. Omitted flags leave fields untouched.
    Update(UpdateArgs),
    /// Delete a task. Its comments are kept.
    Delete(IdArg),
    /// Show the task's event history.
    History(IdArg),
    /// List dependency ids that no longer resolve to a task in the project.
    InvalidDeps(IdArg),
}

#[derive(Args, Debug)]
pub struct IdArg {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub project: String,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub project: String,

    #[arg(long)]
    pub title: String,

    /// todo, in_progress, review, or done.
    #[arg(long)]
    pub status: Option<String>,

    /// low, medium, high, or urgent.
    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Repeat for several tags.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Repeat for several assignees.
    #[arg(long = "assignee", value_name = "USER")]
    pub assignees: Vec<String>,

    /// Repeat for several dependencies.
    #[arg(long = "depends-on", value_name = "TASK")]
    pub dependencies: Vec<String>,

    /// Custom fields as a JSON object.
    #[arg(long, value_name = "JSON")]
    pub fields: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: String,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub status: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Replace the tag list.
    #[arg(long = "tag", value_name = "TAG", conflicts_with = "clear_tags")]
    pub tags: Option<Vec<String>>,

    #[arg(long)]
    pub clear_tags: bool,

    /// Replace the assignee list.
    #[arg(long = "assignee", value_name = "USER", conflicts_with = "clear_assignees")]
    pub assignees: Option<Vec<String>>,

    #[arg(long)]
    pub clear_assignees: bool,

    /// Replace the dependency list.
    #[arg(long = "depends-on", value_name = "TASK", conflicts_with = "clear_dependencies")]
    pub dependencies: Option<Vec<String>>,

    #[arg(long)]
    pub clear_dependencies: bool,

    /// Replace custom fields with this JSON object.
    #[arg(long, value_name = "JSON")]
    pub fields: Option<String>,

    #[arg(long)]
    pub position: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskDetail {
    #[serde(flatten)]
    task: Task,
    comments: Vec<Comment>,
    invalid_dependencies: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidDepsOutput {
    task_id: String,
    invalid_dependencies: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
struct DeleteOutput {
    ok: bool,
    id: String,
}

pub fn run_task(args: &TaskArgs, ctx: &Invocation) -> Result<()> {
    match &args.command {
        TaskCommand::Create(create) => run_create(create, ctx),
        TaskCommand::List(list) => run_list(&list.project, ctx),
        TaskCommand::Show(IdArg { id }) => run_show(id, ctx),
        TaskCommand::Update(update) => run_update(update, ctx),
        TaskCommand::Delete(IdArg { id }) => run_delete(id, ctx),
        TaskCommand::History(IdArg { id }) => run_history(id, ctx),
        TaskCommand::InvalidDeps(IdArg { id }) => run_invalid_deps(id, ctx),
    }
}

fn run_create(args: &CreateArgs, ctx: &Invocation) -> Result<()> {
    let input = NewTask {
        project_id: args.project.clone(),
        title: args.title.clone(),
        status: args.status.as_deref().map(str::parse::<TaskStatus>).transpose()?,
        assigned_to: args.assignees.clone(),
        configuration: TaskConfigurationPatch {
            priority: parse_priority(args.priority.as_deref())?,
            description: args.description.clone().map_or(Patch::Unset, Patch::Set),
            tags: if args.tags.is_empty() {
                Patch::Unset
            } else {
                Patch::Set(args.tags.clone())
            },
            custom_fields: match args.fields.as_deref() {
                Some(raw) => Patch::Set(parse_json_object(raw)?),
                None => Patch::Unset,
            },
        },
        dependencies: args.dependencies.clone(),
    };

    let task = ctx.with_tracker(|tracker| Ok(tracker.tasks().create(input)?))?;
    render(ctx.output, &task, write_task)
}

fn run_list(project_id: &str, ctx: &Invocation) -> Result<()> {
    let tasks = ctx.with_tracker(|tracker| Ok(tracker.tasks().find_by_project_id(project_id)?))?;
    render_mode(
        ctx.output,
        &tasks,
        |tasks, w| {
            for t in tasks {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}",
                    t.id, t.position, t.status, t.configuration.priority, t.title
                )?;
            }
            Ok(())
        },
        |tasks, w| {
            pretty_section(w, &format!("Tasks ({})", tasks.len()))?;
            for t in tasks {
                writeln!(
                    w,
                    "{:>3}  {:<12} {:<7} {}  {}",
                    t.position, t.status, t.configuration.priority, t.id, t.title
                )?;
            }
            Ok(())
        },
    )
}

fn run_show(id: &str, ctx: &Invocation) -> Result<()> {
    let detail = ctx.with_tracker(|tracker| {
        let task = tracker
            .tasks()
            .find_by_id(id)?
            .ok_or_else(|| not_found(AggregateType::Task, id))?;
        let invalid_dependencies = tracker.tasks().invalid_dependencies(id)?.unwrap_or_default();
        let comments = tracker.comments().find_by_task_id(id)?;
        Ok(TaskDetail {
            task,
            comments,
            invalid_dependencies,
        })
    })?;

    render(ctx.output, &detail, |d, w| {
        write_task(&d.task, w)?;
        if !d.invalid_dependencies.is_empty() {
            let stale: Vec<&str> = d.invalid_dependencies.iter().map(String::as_str).collect();
            pretty_kv(w, "stale deps", stale.join(", "))?;
        }
        if !d.comments.is_empty() {
            writeln!(w)?;
            pretty_section(w, &format!("Comments ({})", d.comments.len()))?;
            for c in &d.comments {
                writeln!(w, "{} {}: {}", c.timestamp, c.author, c.content)?;
            }
        }
        Ok(())
    })
}

fn run_update(args: &UpdateArgs, ctx: &Invocation) -> Result<()> {
    let patch = TaskPatch {
        title: args.title.clone().map_or(Patch::Unset, Patch::Set),
        status: args
            .status
            .as_deref()
            .map(str::parse::<TaskStatus>)
            .transpose()?
            .map_or(Patch::Unset, Patch::Set),
        assigned_to: replacement_list(args.assignees.as_ref(), args.clear_assignees),
        configuration: TaskConfigurationPatch {
            priority: parse_priority(args.priority.as_deref())?,
            description: args.description.clone().map_or(Patch::Unset, Patch::Set),
            tags: replacement_list(args.tags.as_ref(), args.clear_tags),
            custom_fields: match args.fields.as_deref() {
                Some(raw) => Patch::Set(parse_json_object(raw)?),
                None => Patch::Unset,
            },
        },
        dependencies: replacement_list(args.dependencies.as_ref(), args.clear_dependencies),
        position: args.position.map_or(Patch::Unset, Patch::Set),
    };

    let task = ctx
        .with_tracker(|tracker| Ok(tracker.tasks().update(&args.id, patch)?))?
        .ok_or_else(|| not_found(AggregateType::Task, &args.id))?;
    render(ctx.output, &task, write_task)
}

fn run_delete(id: &str, ctx: &Invocation) -> Result<()> {
    if !ctx.with_tracker(|tracker| Ok(tracker.tasks().delete(id)?))? {
        return Err(not_found(AggregateType::Task, id));
    }
    render(
        ctx.output,
        &DeleteOutput {
            ok: true,
            id: id.to_string(),
        },
        |o, w| writeln!(w, "deleted task {}", o.id),
    )
}

fn run_history(id: &str, ctx: &Invocation) -> Result<()> {
    let events: Vec<DomainEvent> =
        ctx.with_tracker(|tracker| Ok(tracker.events_for_aggregate(AggregateType::Task, id)?))?;
    render_events(ctx.output, &events, &format!("History of task {id}"))
}

fn run_invalid_deps(id: &str, ctx: &Invocation) -> Result<()> {
    let invalid = ctx
        .with_tracker(|tracker| Ok(tracker.tasks().invalid_dependencies(id)?))?
        .ok_or_else(|| not_found(AggregateType::Task, id))?;
    let out = InvalidDepsOutput {
        task_id: id.to_string(),
        invalid_dependencies: invalid,
    };
    render(ctx.output, &out, |o, w| {
        for dep in &o.invalid_dependencies {
            writeln!(w, "{dep}")?;
        }
        Ok(())
    })
}

fn parse_priority(raw: Option<&str>) -> Result<Patch<Priority>> {
    Ok(raw
        .map(str::parse::<Priority>)
        .transpose()?
        .map_or(Patch::Unset, Patch::Set))
}

/// `--clear-x` empties the list, repeated `--x` replaces it, neither leaves it.
fn replacement_list(values: Option<&Vec<String>>, clear: bool) -> Patch<Vec<String>> {
    if clear {
        Patch::Set(Vec::new())
    } else {
        values.map_or(Patch::Unset, |v| Patch::Set(v.clone()))
    }
}

fn write_task(task: &Task, w: &mut dyn Write) -> io::Result<()> {
    pretty_kv(w, "id", &task.id)?;
    pretty_kv(w, "project", &task.project_id)?;
    pretty_kv(w, "title", &task.title)?;
    pretty_kv(w, "status", task.status.as_str())?;
    pretty_kv(w, "priority", task.configuration.priority.as_str())?;
    if !task.configuration.description.is_empty() {
        pretty_kv(w, "description", &task.configuration.description)?;
    }
    if !task.configuration.tags.is_empty() {
        pretty_kv(w, "tags", task.configuration.tags.join(", "))?;
    }
    if !task.assigned_to.is_empty() {
        pretty_kv(w, "assigned", task.assigned_to.join(", "))?;
    }
    if !task.dependencies.is_empty() {
        pretty_kv(w, "depends on", task.dependencies.join(", "))?;
    }
    pretty_kv(w, "position", task.position.to_string())?;
    pretty_kv(w, "version", task.version.to_string())?;
    pretty_kv(w, "updated", &task.updated_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_list_distinguishes_clear_from_omitted() {
        assert_eq!(replacement_list(None, false), Patch::Unset);
        assert_eq!(replacement_list(None, true), Patch::Set(Vec::new()));
        let tags = vec!["ui".to_string()];
        assert_eq!(replacement_list(Some(&tags), false), Patch::Set(tags.clone()));
    }

    #[test]
    fn parse_priority_rejects_unknown_names() {
        assert_eq!(parse_priority(Some("high")).expect("high"), Patch::Set(Priority::High));
        assert_eq!(parse_priority(None).expect("none"), Patch::Unset);
        assert!(parse_priority(Some("critical")).is_err());
    }
}
