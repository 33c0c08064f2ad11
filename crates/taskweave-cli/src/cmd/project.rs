//! `tw project`: create, inspect, update, and delete projects.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use taskweave_core::event::{AggregateType, DomainEvent};
use taskweave_core::model::{NewProject, Patch, Project, ProjectPatch};

use super::{Invocation, not_found, parse_json_object};
use crate::cmd::events::render_events;
use crate::output::{pretty_kv, pretty_section, render, render_mode};

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Create a project.
    Create(CreateArgs),
    /// List projects, newest first.
    List,
    /// Show one project with its task count.
    Show(IdArg),
    /// Change a project's name, description, or metadata.
    Update(UpdateArgs),
    /// Delete a project. Its tasks and comments are kept.
    Delete(IdArg),
    /// Show the project's event history.
    History(IdArg),
}

#[derive(Args, Debug)]
pub struct IdArg {
    pub id: String,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub description: Option<String>,

    /// Free-form metadata as a JSON object.
    #[arg(long, value_name = "JSON")]
    pub metadata: Option<String>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    #[arg(long)]
    pub clear_description: bool,

    #[arg(long, value_name = "JSON", conflicts_with = "clear_metadata")]
    pub metadata: Option<String>,

    #[arg(long)]
    pub clear_metadata: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectDetail {
    #[serde(flatten)]
    project: Project,
    task_count: usize,
}

#[derive(Debug, Serialize)]
struct DeleteOutput {
    ok: bool,
    id: String,
}

pub fn run_project(args: &ProjectArgs, ctx: &Invocation) -> Result<()> {
    match &args.command {
        ProjectCommand::Create(create) => run_create(create, ctx),
        ProjectCommand::List => run_list(ctx),
        ProjectCommand::Show(IdArg { id }) => run_show(id, ctx),
        ProjectCommand::Update(update) => run_update(update, ctx),
        ProjectCommand::Delete(IdArg { id }) => run_delete(id, ctx),
        ProjectCommand::History(IdArg { id }) => run_history(id, ctx),
    }
}

fn run_create(args: &CreateArgs, ctx: &Invocation) -> Result<()> {
    let input = NewProject {
        name: args.name.clone(),
        description: args.description.clone(),
        metadata: args.metadata.as_deref().map(parse_json_object).transpose()?,
    };
    let project = ctx.with_tracker(|tracker| Ok(tracker.projects().create(input)?))?;
    render(ctx.output, &project, write_project)
}

fn run_list(ctx: &Invocation) -> Result<()> {
    let projects = ctx.with_tracker(|tracker| Ok(tracker.projects().find_all()?))?;
    render_mode(
        ctx.output,
        &projects,
        |projects, w| {
            for p in projects {
                writeln!(w, "{}\t{}\t{}", p.id, p.created_at, p.name)?;
            }
            Ok(())
        },
        |projects, w| {
            pretty_section(w, &format!("Projects ({})", projects.len()))?;
            for p in projects {
                writeln!(w, "{}  {}", p.id, p.name)?;
            }
            Ok(())
        },
    )
}

fn run_show(id: &str, ctx: &Invocation) -> Result<()> {
    let detail = ctx.with_tracker(|tracker| {
        let repo = tracker.projects();
        let project = repo
            .find_by_id(id)?
            .ok_or_else(|| not_found(AggregateType::Project, id))?;
        let task_count = repo.task_count(id)?;
        Ok(ProjectDetail {
            project,
            task_count,
        })
    })?;
    render(ctx.output, &detail, |d, w| {
        write_project(&d.project, w)?;
        pretty_kv(w, "tasks", d.task_count.to_string())
    })
}

fn run_update(args: &UpdateArgs, ctx: &Invocation) -> Result<()> {
    let patch = ProjectPatch {
        name: args.name.clone().map_or(Patch::Unset, Patch::Set),
        description: if args.clear_description {
            Patch::Set(None)
        } else {
            args.description.clone().map_or(Patch::Unset, |d| Patch::Set(Some(d)))
        },
        metadata: if args.clear_metadata {
            Patch::Set(None)
        } else {
            match args.metadata.as_deref() {
                Some(raw) => Patch::Set(Some(parse_json_object(raw)?)),
                None => Patch::Unset,
            }
        },
    };

    let project = ctx
        .with_tracker(|tracker| Ok(tracker.projects().update(&args.id, patch)?))?
        .ok_or_else(|| not_found(AggregateType::Project, &args.id))?;
    render(ctx.output, &project, write_project)
}

fn run_delete(id: &str, ctx: &Invocation) -> Result<()> {
    if !ctx.with_tracker(|tracker| Ok(tracker.projects().delete(id)?))? {
        return Err(not_found(AggregateType::Project, id));
    }
    render(
        ctx.output,
        &DeleteOutput {
            ok: true,
            id: id.to_string(),
        },
        |o, w| writeln!(w, "deleted project {}", o.id),
    )
}

fn run_history(id: &str, ctx: &Invocation) -> Result<()> {
    let events: Vec<DomainEvent> = ctx.with_tracker(|tracker| {
        Ok(tracker.events_for_aggregate(AggregateType::Project, id)?)
    })?;
    render_events(ctx.output, &events, &format!("History of project {id}"))
}

fn write_project(project: &Project, w: &mut dyn Write) -> io::Result<()> {
    pretty_kv(w, "id", &project.id)?;
    pretty_kv(w, "name", &project.name)?;
    if let Some(ref description) = project.description {
        pretty_kv(w, "description", description)?;
    }
    if let Some(ref metadata) = project.metadata {
        pretty_kv(w, "metadata", serde_json::Value::Object(metadata.clone()).to_string())?;
    }
    pretty_kv(w, "created", &project.created_at)?;
    pretty_kv(w, "updated", &project.updated_at)
}
