//! Main CLI application structure

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::output::{Output, OutputFormat};
use super::{data, query, task};
use crate::domain::{
    parse_due_date, parse_scheduled_date, NewTask, TaskId, TaskPatch, TaskPriority, TaskStatus,
};
use crate::manager::TaskManager;
use crate::storage::{Config, FileKvStore, LocalStorage, SettingsPatch};

/// The manager as the CLI uses it: file-backed document storage
pub type Manager = TaskManager<LocalStorage<FileKvStore>>;

#[derive(Parser)]
#[command(name = "tg")]
#[command(author, version, about = "Hierarchical tasks with dependencies, stored locally")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the configured format)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Directory holding the task data
    #[arg(long, global = true, env = "TASKGRAPH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a task
    ///
    /// Examples:
    ///   tg add "Write report"
    ///   tg add "Draft outline" --parent task_1700000000000_0a1b2c3d4
    Add {
        /// Task title
        title: String,

        /// Parent task ID (the new task becomes its subtask)
        #[arg(long, short)]
        parent: Option<TaskId>,

        #[arg(long, short)]
        description: Option<String>,

        #[arg(long)]
        status: Option<TaskStatus>,

        #[arg(long)]
        priority: Option<TaskPriority>,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_due_date)]
        due: Option<DateTime<Utc>>,

        /// Scheduled day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_scheduled_date)]
        scheduled: Option<NaiveDate>,

        /// Tag (repeatable)
        #[arg(long = "tag", short)]
        tags: Vec<String>,

        #[arg(long)]
        category: Option<String>,
    },

    /// Edit task fields
    Edit {
        /// Task ID
        id: TaskId,

        #[arg(long)]
        title: Option<String>,

        #[arg(long, short)]
        description: Option<String>,

        #[arg(long)]
        status: Option<TaskStatus>,

        #[arg(long)]
        priority: Option<TaskPriority>,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_due_date, conflicts_with = "clear_due")]
        due: Option<DateTime<Utc>>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,

        /// Scheduled day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_scheduled_date, conflicts_with = "clear_scheduled")]
        scheduled: Option<NaiveDate>,

        /// Remove the scheduled day
        #[arg(long)]
        clear_scheduled: bool,

        /// Replace the tags (repeatable)
        #[arg(long = "tag", short)]
        tags: Vec<String>,

        /// Remove every tag
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,

        #[arg(long)]
        category: Option<String>,
    },

    /// Delete a task and all its subtasks
    Rm {
        /// Task ID
        id: TaskId,
    },

    /// Toggle completion (completing the last open subtask completes the parent)
    Done {
        /// Task ID
        id: TaskId,
    },

    /// Move a task under another parent, or to the top level
    Move {
        /// Task ID
        id: TaskId,

        /// New parent (omit to make the task top-level)
        parent: Option<TaskId>,
    },

    /// Add a dependency between tasks
    Dep {
        /// Task that will be blocked
        task: TaskId,

        /// Task that must be completed first
        depends_on: TaskId,
    },

    /// Remove a dependency
    Undep {
        /// Task to unblock
        task: TaskId,

        /// Dependency to remove
        depends_on: TaskId,
    },

    /// Show task details
    Show {
        /// Task ID
        id: TaskId,
    },

    /// List tasks
    List {
        /// Only tasks with this status
        #[arg(long)]
        status: Option<TaskStatus>,

        /// Only top-level tasks
        #[arg(long, conflicts_with = "parent")]
        roots: bool,

        /// Only direct subtasks of this task
        #[arg(long)]
        parent: Option<TaskId>,
    },

    /// Show the task hierarchy
    Tree,

    /// Show tasks ready to work on
    Ready,

    /// Show blocked tasks
    Blocked,

    /// Show unfinished tasks past their due date
    Overdue,

    /// Show tasks scheduled for today
    Today,

    /// Search titles, descriptions and tags
    Search {
        /// Search query
        query: String,
    },

    /// Show task statistics
    Stats,

    /// Show every task in dependency order
    Order,

    /// Export all data as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Import data from an export, replacing all tasks
    Import {
        /// Export file ("-" reads stdin)
        file: PathBuf,
    },

    /// Show or change settings
    Settings {
        #[arg(long)]
        theme: Option<String>,

        #[arg(long)]
        language: Option<String>,

        #[arg(long)]
        default_priority: Option<TaskPriority>,

        #[arg(long, action = clap::ArgAction::Set, value_name = "BOOL")]
        auto_save: Option<bool>,
    },

    /// Show storage usage
    Info,

    /// Delete all stored data
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

/// Installs the stderr log subscriber
///
/// `RUST_LOG` wins; otherwise `--verbose` means debug, else the configured level.
fn init_tracing(verbose: bool, configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { configured };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    });

    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Opens the manager over the data directory
pub fn open_manager(data_dir: Option<PathBuf>, config: &Config) -> Result<Manager> {
    let dir = data_dir
        .or_else(|| config.data_dir())
        .context("Could not determine a data directory; pass --data-dir")?;
    debug!(dir = %dir.display(), "Opening task store");

    Ok(TaskManager::new(LocalStorage::new(FileKvStore::new(dir))))
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    init_tracing(cli.verbose, &config.log.level);

    let output = Output::new(cli.format.unwrap_or(config.output.default_format));
    let mut manager = open_manager(cli.data_dir, &config)?;

    match cli.command {
        Commands::Add {
            title,
            parent,
            description,
            status,
            priority,
            due,
            scheduled,
            tags,
            category,
        } => {
            let fields = NewTask {
                title,
                description: description.unwrap_or_default(),
                status,
                priority,
                due_date: due,
                scheduled_date: scheduled,
                parent_id: parent,
                tags,
                category,
            };
            task::add(&mut manager, &output, fields)?
        }
        Commands::Edit {
            id,
            title,
            description,
            status,
            priority,
            due,
            clear_due,
            scheduled,
            clear_scheduled,
            tags,
            clear_tags,
            category,
        } => {
            let patch = TaskPatch {
                title,
                description,
                status,
                priority,
                due_date: if clear_due { Some(None) } else { due.map(Some) },
                scheduled_date: if clear_scheduled {
                    Some(None)
                } else {
                    scheduled.map(Some)
                },
                tags: if clear_tags {
                    Some(Vec::new())
                } else {
                    (!tags.is_empty()).then_some(tags)
                },
                category,
            };
            task::edit(&mut manager, &output, &id, patch)?
        }
        Commands::Rm { id } => task::remove(&mut manager, &output, &id)?,
        Commands::Done { id } => task::toggle(&mut manager, &output, &id)?,
        Commands::Move { id, parent } => task::move_to(&mut manager, &output, &id, parent.as_ref())?,
        Commands::Dep { task, depends_on } => {
            task::add_dependency(&mut manager, &output, &task, &depends_on)?
        }
        Commands::Undep { task, depends_on } => {
            task::remove_dependency(&mut manager, &output, &task, &depends_on)?
        }
        Commands::Show { id } => task::show(&manager, &output, &id)?,

        Commands::List {
            status,
            roots,
            parent,
        } => query::list(&manager, &output, status, roots, parent.as_ref())?,
        Commands::Tree => query::tree(&manager, &output)?,
        Commands::Ready => query::ready(&manager, &output)?,
        Commands::Blocked => query::blocked(&manager, &output)?,
        Commands::Overdue => query::overdue(&manager, &output)?,
        Commands::Today => query::today(&manager, &output)?,
        Commands::Search { query } => query::search(&manager, &output, &query)?,
        Commands::Stats => query::stats(&manager, &output)?,
        Commands::Order => query::order(&manager, &output)?,

        Commands::Export { output: path } => data::export(&manager, &output, path.as_deref())?,
        Commands::Import { file } => data::import(&mut manager, &output, &file)?,
        Commands::Settings {
            theme,
            language,
            default_priority,
            auto_save,
        } => {
            let patch = SettingsPatch {
                theme,
                language,
                default_priority,
                auto_save,
            };
            data::settings(&mut manager, &output, patch)?
        }
        Commands::Info => data::info(&manager, &output)?,
        Commands::Clear { yes } => data::clear(&mut manager, &output, yes)?,
    }

    debug!("Command completed");
    Ok(())
}
