use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::task::{Priority, Status, TaskId};
use crate::task_list::{PriorityFilter, StatusFilter};

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "daybook",
    version,
    about = "Daybook: tasks and a weekly calendar over one local task store",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a task.
    Add(AddArgs),
    /// List tasks, optionally filtered by priority and status.
    List(ListArgs),
    /// Flip a task between completed and todo.
    Toggle { id: TaskId },
    /// Delete a task.
    Delete { id: TaskId },
    /// Edit a task through the task form.
    Edit(EditArgs),
    /// Show the completion summary.
    Progress,
    /// Show the week grid and the unscheduled tasks.
    Calendar(CalendarArgs),
    /// Drop a task onto a day and confirm a time.
    Schedule {
        id: TaskId,
        /// today, tomorrow, a weekday name, or YYYY-MM-DD
        day: String,
        /// HH:MM
        time: String,
    },
    /// Remove a task from the calendar.
    Unschedule { id: TaskId },
    /// Print the stored task collection as JSON.
    Export,
    /// Print the effective configuration.
    Show,
}

impl Command {
    /// Commands usable as `default.command`.
    pub fn from_default_name(name: &str) -> anyhow::Result<Self> {
        match name.trim() {
            "list" => Ok(Command::List(ListArgs::default())),
            "calendar" => Ok(Command::Calendar(CalendarArgs::default())),
            "progress" => Ok(Command::Progress),
            "export" => Ok(Command::Export),
            other => Err(anyhow!(
                "unsupported default.command: {other} (expected list, calendar, progress or export)"
            )),
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(short = 'p', long)]
    pub priority: Option<Priority>,

    #[arg(short = 's', long)]
    pub status: Option<Status>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ListArgs {
    #[arg(short = 'p', long, default_value = "all")]
    pub priority: PriorityFilterArg,

    #[arg(short = 's', long, default_value = "all")]
    pub status: StatusFilterArg,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct EditArgs {
    pub id: TaskId,

    #[arg(short = 't', long)]
    pub title: Option<String>,

    #[arg(short = 'd', long)]
    pub description: Option<String>,

    #[arg(short = 'p', long)]
    pub priority: Option<Priority>,

    #[arg(short = 's', long)]
    pub status: Option<Status>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarArgs {
    /// Any day inside the week to show.
    #[arg(short = 'w', long)]
    pub week: Option<String>,

    /// Weeks to move from there, e.g. -1 or 2.
    #[arg(short = 'o', long, default_value_t = 0, allow_negative_numbers = true)]
    pub offset: i32,

    /// Print empty hour rows as well.
    #[arg(long)]
    pub all_hours: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityFilterArg(pub PriorityFilter);

impl std::str::FromStr for PriorityFilterArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(PriorityFilterArg)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFilterArg(pub StatusFilter);

impl std::str::FromStr for StatusFilterArg {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(StatusFilterArg)
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
