use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, instrument};

use crate::calendar::CalendarView;
use crate::events::{TaskObserver, broadcast};
use crate::store::TaskStore;
use crate::task::{Task, TaskId};
use crate::task_list::{EditMode, PriorityFilter, StatusFilter, TaskForm, TaskListView};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tab {
    #[default]
    TaskList,
    Calendar,
}

impl Tab {
    pub fn as_key(self) -> &'static str {
        match self {
            Tab::TaskList => "task-list",
            Tab::Calendar => "calendar",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().trim_start_matches('#') {
            "task-list" => Some(Tab::TaskList),
            "calendar" => Some(Tab::Calendar),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskListMsg {
    SetPriorityFilter(PriorityFilter),
    SetStatusFilter(StatusFilter),
    FillForm(TaskForm),
    Submit,
    BeginEdit(TaskId),
    CancelEdit,
    ToggleComplete(TaskId),
    Delete(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarMsg {
    PreviousWeek,
    NextWeek,
    GoTo(NaiveDate),
    DragStart(TaskId),
    DragEnd,
    Drop { day: u32, hour: u32 },
    SetTime(String),
    ConfirmTime,
    CancelTime,
    Unschedule(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    Navigate(Tab),
    TaskList(TaskListMsg),
    Calendar(CalendarMsg),
}

/// What a handler produced, if anything worth reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub task: Option<Task>,
    pub handled: bool,
}

impl Outcome {
    fn handled() -> Self {
        Self {
            task: None,
            handled: true,
        }
    }

    fn ignored() -> Self {
        Self::default()
    }

    fn with_task(task: Option<Task>) -> Self {
        Self {
            handled: task.is_some(),
            task,
        }
    }
}

/// Owns the store and every mounted view. Views are built from one load on
/// `open` and dropped with the workspace.
pub struct Workspace {
    store: TaskStore,
    task_list: TaskListView,
    calendar: CalendarView,
    active: Tab,
}

impl Workspace {
    #[instrument(skip(store, tz))]
    pub fn open(
        store: TaskStore,
        edit_mode: EditMode,
        tz: Tz,
        today: NaiveDate,
    ) -> anyhow::Result<Self> {
        let tasks = store.load()?;
        Ok(Self {
            task_list: TaskListView::new(tasks.clone(), edit_mode, tz),
            calendar: CalendarView::new(tasks, today, tz),
            store,
            active: Tab::default(),
        })
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn task_list(&self) -> &TaskListView {
        &self.task_list
    }

    pub fn calendar(&self) -> &CalendarView {
        &self.calendar
    }

    pub fn active(&self) -> Tab {
        self.active
    }

    /// Runs one message to completion, then lets every view catch up with
    /// whatever the store committed.
    #[instrument(skip(self, now))]
    pub fn dispatch(&mut self, msg: Msg, now: DateTime<Utc>) -> anyhow::Result<Outcome> {
        let outcome = match msg {
            Msg::Navigate(tab) => {
                if self.active == tab {
                    Outcome::ignored()
                } else {
                    self.active = tab;
                    Outcome::handled()
                }
            }
            Msg::TaskList(msg) => self.handle_task_list(msg, now)?,
            Msg::Calendar(msg) => self.handle_calendar(msg, now)?,
        };

        self.flush_changes()?;
        Ok(outcome)
    }

    fn handle_task_list(&mut self, msg: TaskListMsg, now: DateTime<Utc>) -> anyhow::Result<Outcome> {
        let view = &mut self.task_list;
        let store = &mut self.store;
        Ok(match msg {
            TaskListMsg::SetPriorityFilter(filter) => {
                view.set_priority_filter(filter);
                Outcome::handled()
            }
            TaskListMsg::SetStatusFilter(filter) => {
                view.set_status_filter(filter);
                Outcome::handled()
            }
            TaskListMsg::FillForm(form) => {
                *view.form_mut() = form;
                Outcome::handled()
            }
            TaskListMsg::Submit => Outcome::with_task(Some(view.submit(store, now)?)),
            TaskListMsg::BeginEdit(id) => {
                if view.begin_edit(store, id)? {
                    Outcome::handled()
                } else {
                    Outcome::ignored()
                }
            }
            TaskListMsg::CancelEdit => {
                view.cancel_edit();
                Outcome::handled()
            }
            TaskListMsg::ToggleComplete(id) => Outcome::with_task(view.toggle_complete(store, id, now)?),
            TaskListMsg::Delete(id) => Outcome::with_task(view.delete(store, id)?),
        })
    }

    fn handle_calendar(&mut self, msg: CalendarMsg, now: DateTime<Utc>) -> anyhow::Result<Outcome> {
        let view = &mut self.calendar;
        Ok(match msg {
            CalendarMsg::PreviousWeek => {
                view.previous_week();
                Outcome::handled()
            }
            CalendarMsg::NextWeek => {
                view.next_week();
                Outcome::handled()
            }
            CalendarMsg::GoTo(date) => {
                view.go_to(date);
                Outcome::handled()
            }
            CalendarMsg::DragStart(id) => {
                if view.drag_start(id) {
                    Outcome::handled()
                } else {
                    Outcome::ignored()
                }
            }
            CalendarMsg::DragEnd => {
                view.drag_end();
                Outcome::handled()
            }
            CalendarMsg::Drop { day, hour } => {
                if view.drop_on(day, hour)? {
                    Outcome::handled()
                } else {
                    Outcome::ignored()
                }
            }
            CalendarMsg::SetTime(input) => {
                if view.set_time_input(&input) {
                    Outcome::handled()
                } else {
                    Outcome::ignored()
                }
            }
            CalendarMsg::ConfirmTime => Outcome::with_task(view.confirm(&mut self.store, now)?),
            CalendarMsg::CancelTime => {
                view.cancel();
                Outcome::handled()
            }
            CalendarMsg::Unschedule(id) => Outcome::with_task(view.unschedule(&mut self.store, id, now)?),
        })
    }

    fn flush_changes(&mut self) -> anyhow::Result<()> {
        let events = self.store.take_events();
        if events.is_empty() {
            return Ok(());
        }

        debug!(count = events.len(), ?events, "broadcasting task changes");
        let tasks = self.store.load()?;
        let mut observers: [&mut dyn TaskObserver; 2] = [&mut self.task_list, &mut self.calendar];
        broadcast(&mut observers, &tasks);
        Ok(())
    }
}
