use anyhow::anyhow;
use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, info, instrument};

use crate::cli::{AddArgs, CalendarArgs, Command, EditArgs, ListArgs};
use crate::config::Config;
use crate::datetime::{format_clock, parse_clock_time, parse_day_expr};
use crate::render::Renderer;
use crate::shell::{CalendarMsg, Msg, Outcome, Tab, TaskListMsg, Workspace};
use crate::task::TaskId;
use crate::task_list::TaskForm;

#[instrument(skip(workspace, cfg, renderer, now))]
pub fn dispatch(
    workspace: &mut Workspace,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(workspace, args, now),
        Command::List(args) => cmd_list(workspace, renderer, args, now),
        Command::Toggle { id } => cmd_toggle(workspace, id, now),
        Command::Delete { id } => cmd_delete(workspace, id, now),
        Command::Edit(args) => cmd_edit(workspace, args, now),
        Command::Progress => cmd_progress(workspace, renderer),
        Command::Calendar(args) => cmd_calendar(workspace, renderer, args, now),
        Command::Schedule { id, day, time } => cmd_schedule(workspace, id, &day, &time, now),
        Command::Unschedule { id } => cmd_unschedule(workspace, id, now),
        Command::Export => cmd_export(workspace),
        Command::Show => cmd_show(cfg),
    }
}

fn not_found(id: TaskId) -> anyhow::Error {
    anyhow!("task {id} not found")
}

fn task_list(workspace: &mut Workspace, msg: TaskListMsg, now: DateTime<Utc>) -> anyhow::Result<Outcome> {
    workspace.dispatch(Msg::TaskList(msg), now)
}

fn calendar(workspace: &mut Workspace, msg: CalendarMsg, now: DateTime<Utc>) -> anyhow::Result<Outcome> {
    workspace.dispatch(Msg::Calendar(msg), now)
}

#[instrument(skip(workspace, args, now))]
fn cmd_add(workspace: &mut Workspace, args: AddArgs, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command add");

    let form = TaskForm {
        title: args.title.join(" "),
        description: args.description.unwrap_or_default(),
        priority: args.priority.unwrap_or_default(),
        status: args.status.unwrap_or_default(),
    };
    task_list(workspace, TaskListMsg::FillForm(form), now)?;
    let created = task_list(workspace, TaskListMsg::Submit, now)?
        .task
        .ok_or_else(|| anyhow!("task form produced no task"))?;

    println!("Created task {}.", created.id);
    Ok(())
}

#[instrument(skip(workspace, renderer, args, now))]
fn cmd_list(
    workspace: &mut Workspace,
    renderer: &Renderer,
    args: ListArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");

    workspace.dispatch(Msg::Navigate(Tab::TaskList), now)?;
    task_list(workspace, TaskListMsg::SetPriorityFilter(args.priority.0), now)?;
    task_list(workspace, TaskListMsg::SetStatusFilter(args.status.0), now)?;

    renderer.print_task_list(&workspace.task_list().render())
}

#[instrument(skip(workspace, now))]
fn cmd_toggle(workspace: &mut Workspace, id: TaskId, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command toggle");

    let task = task_list(workspace, TaskListMsg::ToggleComplete(id), now)?
        .task
        .ok_or_else(|| not_found(id))?;

    println!("Task {} is now {}.", task.id, task.status.label());
    Ok(())
}

#[instrument(skip(workspace, now))]
fn cmd_delete(workspace: &mut Workspace, id: TaskId, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command delete");

    let removed = task_list(workspace, TaskListMsg::Delete(id), now)?
        .task
        .ok_or_else(|| not_found(id))?;

    println!("Deleted task {} '{}'.", removed.id, removed.title);
    Ok(())
}

/// Runs the edit flow the way the form would: load the task into the form,
/// overwrite the given fields, submit.
#[instrument(skip(workspace, args, now), fields(id = %args.id))]
fn cmd_edit(workspace: &mut Workspace, args: EditArgs, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command edit");

    if !task_list(workspace, TaskListMsg::BeginEdit(args.id), now)?.handled {
        return Err(not_found(args.id));
    }

    let mut form = workspace.task_list().form().clone();
    if let Some(title) = args.title {
        form.title = title;
    }
    if let Some(description) = args.description {
        form.description = description;
    }
    if let Some(priority) = args.priority {
        form.priority = priority;
    }
    if let Some(status) = args.status {
        form.status = status;
    }

    task_list(workspace, TaskListMsg::FillForm(form), now)?;
    let saved = task_list(workspace, TaskListMsg::Submit, now)?
        .task
        .ok_or_else(|| anyhow!("task form produced no task"))?;

    if saved.id == args.id {
        println!("Updated task {}.", saved.id);
    } else {
        println!("Replaced task {} with task {}.", args.id, saved.id);
    }
    Ok(())
}

fn cmd_progress(workspace: &Workspace, renderer: &Renderer) -> anyhow::Result<()> {
    renderer.print_progress(&workspace.task_list().progress())
}

#[instrument(skip(workspace, renderer, args, now))]
fn cmd_calendar(
    workspace: &mut Workspace,
    renderer: &Renderer,
    args: CalendarArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command calendar");

    workspace.dispatch(Msg::Navigate(Tab::Calendar), now)?;
    if let Some(week) = args.week.as_deref() {
        let tz = workspace.calendar().timezone();
        let reference = parse_day_expr(week, now, &tz)?;
        calendar(workspace, CalendarMsg::GoTo(reference), now)?;
    }

    let step = if args.offset < 0 {
        CalendarMsg::PreviousWeek
    } else {
        CalendarMsg::NextWeek
    };
    for _ in 0..args.offset.unsigned_abs() {
        calendar(workspace, step.clone(), now)?;
    }

    let model = workspace.calendar().render()?;
    renderer.print_calendar(&model, args.all_hours)
}

/// Replays a drag onto `(day, hour)` of the day's week, then types the time
/// into the prompt and confirms it.
#[instrument(skip(workspace, now))]
fn cmd_schedule(
    workspace: &mut Workspace,
    id: TaskId,
    day: &str,
    time: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command schedule");

    let tz = workspace.calendar().timezone();
    let date = parse_day_expr(day, now, &tz)?;
    let (hour, _) =
        parse_clock_time(time).ok_or_else(|| anyhow!("invalid time: {time} (expected HH:MM)"))?;

    workspace.dispatch(Msg::Navigate(Tab::Calendar), now)?;
    calendar(workspace, CalendarMsg::GoTo(date), now)?;
    if !calendar(workspace, CalendarMsg::DragStart(id), now)?.handled {
        return Err(not_found(id));
    }
    let day_offset = date.weekday().num_days_from_sunday();
    calendar(workspace, CalendarMsg::Drop { day: day_offset, hour }, now)?;
    calendar(workspace, CalendarMsg::DragEnd, now)?;
    calendar(workspace, CalendarMsg::SetTime(time.to_string()), now)?;

    let confirmed = calendar(workspace, CalendarMsg::ConfirmTime, now)?;
    let Some(task) = confirmed.task else {
        calendar(workspace, CalendarMsg::CancelTime, now)?;
        return Err(not_found(id));
    };

    let when = task
        .date
        .map(|date| format_clock(date, &tz))
        .unwrap_or_default();
    println!("Scheduled task {} on {date} at {when}.", task.id);
    Ok(())
}

#[instrument(skip(workspace, now))]
fn cmd_unschedule(workspace: &mut Workspace, id: TaskId, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command unschedule");

    let task = calendar(workspace, CalendarMsg::Unschedule(id), now)?
        .task
        .ok_or_else(|| not_found(id))?;

    println!("Task {} is unscheduled.", task.id);
    Ok(())
}

#[instrument(skip(workspace))]
fn cmd_export(workspace: &Workspace) -> anyhow::Result<()> {
    info!("command export");

    let tasks = workspace.store().load()?;
    let out = serde_json::to_string(&tasks)?;
    println!("{out}");
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<_> = cfg.iter().collect();
    entries.sort();
    for (k, v) in entries {
        println!("{k}={v}");
    }
    for path in &cfg.loaded_files {
        println!("# loaded {}", path.display());
    }
    Ok(())
}
