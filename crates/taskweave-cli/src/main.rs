#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tw: event-sourced collaborative task tracker",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Use this database file instead of `.taskweave/tracker.db`.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a tracker in the current directory",
        long_about = "Create `.taskweave/` with a default config and an empty store.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    tw init\n\n    # Overwrite an existing config\n    tw init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Entities",
        about = "Create, inspect, and change projects",
        after_help = "EXAMPLES:\n    # Create a project\n    tw project create --name Roadmap\n\n    # List projects as JSON\n    tw project list --json"
    )]
    Project(cmd::project::ProjectArgs),

    #[command(
        next_help_heading = "Entities",
        about = "Create, inspect, and change tasks",
        after_help = "EXAMPLES:\n    # Create a task that depends on another\n    tw task create --project <P> --title Build --depends-on <T1>\n\n    # Move a task to review\n    tw task update <T> --status review"
    )]
    Task(cmd::task::TaskArgs),

    #[command(
        next_help_heading = "Entities",
        about = "Add, list, and delete task comments",
        after_help = "EXAMPLES:\n    # Comment on a task\n    tw comment add <T> \"Looks good\" --author ana"
    )]
    Comment(cmd::comment::CommentArgs),

    #[command(
        next_help_heading = "Catch-up",
        about = "List a project's events since a timestamp",
        long_about = "List every event affecting a project (including its tasks and comments) with a timestamp after --since.",
        after_help = "EXAMPLES:\n    # Everything since a reconnect point\n    tw sync <P> --since 2025-01-01T00:00:00.000Z"
    )]
    Sync(cmd::events::SyncArgs),

    #[command(
        next_help_heading = "Catch-up",
        about = "List a project's change-feed entries since a timestamp"
    )]
    Feed(cmd::events::FeedArgs),

    #[command(
        next_help_heading = "Maintenance",
        about = "Rebuild materialized tables from the event log",
        after_help = "EXAMPLES:\n    # Replay the whole log\n    tw rebuild"
    )]
    Rebuild,

    #[command(
        next_help_heading = "Maintenance",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    tw completions bash"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("TASKWEAVE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "taskweave=debug,info"
        } else {
            "taskweave=info,warn"
        })
    });

    let format = env::var("TASKWEAVE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let output = cli.output_mode();
    let ctx = cmd::Invocation {
        project_root,
        db: cli.db.clone(),
        output,
    };

    let command_result = match cli.command {
        Commands::Init(ref args) => cmd::init::run_init(args, &ctx),
        Commands::Project(ref args) => cmd::project::run_project(args, &ctx),
        Commands::Task(ref args) => cmd::task::run_task(args, &ctx),
        Commands::Comment(ref args) => cmd::comment::run_comment(args, &ctx),
        Commands::Sync(ref args) => cmd::events::run_sync(args, &ctx),
        Commands::Feed(ref args) => cmd::events::run_feed(args, &ctx),
        Commands::Rebuild => cmd::events::run_rebuild(&ctx),
        Commands::Completions(ref args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    };

    if let Err(err) = command_result {
        let cli_error = err
            .downcast_ref::<taskweave_core::Error>()
            .map_or_else(|| CliError::new(format!("{err:#}")), CliError::from);
        output::render_error(output, &cli_error)?;
        std::process::exit(1);
    }
    Ok(())
}
