use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use crate::events::TaskObserver;
use crate::store::TaskStore;
use crate::task::{Priority, Status, Task, TaskDraft, TaskId, TaskPatch};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriorityFilter {
    #[default]
    All,
    Only(Priority),
}

impl PriorityFilter {
    pub fn matches(self, priority: Priority) -> bool {
        match self {
            PriorityFilter::All => true,
            PriorityFilter::Only(wanted) => wanted == priority,
        }
    }
}

impl FromStr for PriorityFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(PriorityFilter::All);
        }
        Ok(PriorityFilter::Only(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

impl StatusFilter {
    pub fn matches(self, status: Status) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => wanted == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        Ok(StatusFilter::Only(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub priority: PriorityFilter,
    pub status: StatusFilter,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.priority.matches(task.priority) && self.status.matches(task.status)
    }
}

/// How `begin_edit` treats the record being edited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EditMode {
    /// The record stays put; the next submit updates it under the same id and
    /// `cancel_edit` leaves it untouched.
    #[default]
    InPlace,
    /// Legacy flow: the record is deleted as soon as editing starts and the next
    /// submit recreates it with a fresh id. Abandoning the edit loses the task.
    Replace,
}

impl FromStr for EditMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in-place" | "inplace" | "update" => Ok(EditMode::InPlace),
            "replace" | "legacy" => Ok(EditMode::Replace),
            other => Err(anyhow!("invalid edit mode: {other} (expected in-place or replace)")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskForm {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
}

impl TaskForm {
    fn fill_from(&mut self, task: &Task) {
        self.title = task.title.clone();
        self.description = task.description.clone();
        self.priority = task.priority;
        self.status = task.status;
    }

    fn to_draft(&self) -> TaskDraft {
        TaskDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            status: self.status,
            date: None,
        }
    }

    fn to_patch(&self) -> TaskPatch {
        TaskPatch {
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            priority: Some(self.priority),
            status: Some(self.status),
            date: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    pub percentage: u32,
}

impl Progress {
    pub fn of(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|task| task.is_completed()).count();
        let percentage = if total == 0 {
            0
        } else {
            (completed as f64 * 100.0 / total as f64).round() as u32
        };
        Self {
            total,
            completed,
            percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCard {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub priority_badge: &'static str,
    pub status: Status,
    pub status_label: &'static str,
    pub created: String,
    pub action_label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListModel {
    pub cards: Vec<TaskCard>,
    pub empty_message: Option<&'static str>,
    pub progress: Progress,
}

pub const NO_TASKS_MESSAGE: &str = "No tasks found";

/// Filtered task list with its submission form.
#[derive(Debug)]
pub struct TaskListView {
    tasks: Vec<Task>,
    filter: TaskFilter,
    form: TaskForm,
    edit_mode: EditMode,
    editing: Option<TaskId>,
    tz: Tz,
}

impl TaskListView {
    pub fn new(tasks: Vec<Task>, edit_mode: EditMode, tz: Tz) -> Self {
        debug!(count = tasks.len(), ?edit_mode, "mounted task list view");
        Self {
            tasks,
            filter: TaskFilter::default(),
            form: TaskForm::default(),
            edit_mode,
            editing: None,
            tz,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn filter(&self) -> TaskFilter {
        self.filter
    }

    pub fn set_priority_filter(&mut self, priority: PriorityFilter) {
        self.filter.priority = priority;
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        self.filter.status = status;
    }

    pub fn form(&self) -> &TaskForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut TaskForm {
        &mut self.form
    }

    pub fn editing(&self) -> Option<TaskId> {
        self.editing
    }

    pub fn filtered(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|task| self.filter.matches(task)).collect()
    }

    pub fn progress(&self) -> Progress {
        Progress::of(&self.tasks)
    }

    /// Turns the form into a task (or, mid in-place edit, into an update) and
    /// resets the form.
    #[instrument(skip(self, store, now))]
    pub fn submit(&mut self, store: &mut TaskStore, now: DateTime<Utc>) -> anyhow::Result<Task> {
        let task = match self.editing.take() {
            Some(id) if self.edit_mode == EditMode::InPlace => {
                match store.update(id, self.form.to_patch(), now)? {
                    Some(task) => task,
                    None => {
                        warn!(id = %id, "edited task vanished; creating it again");
                        store.create(self.form.to_draft(), now)?
                    }
                }
            }
            _ => store.create(self.form.to_draft(), now)?,
        };

        self.form = TaskForm::default();
        self.reload(store)?;
        info!(id = %task.id, "task form submitted");
        Ok(task)
    }

    #[instrument(skip(self, store))]
    pub fn begin_edit(&mut self, store: &mut TaskStore, id: TaskId) -> anyhow::Result<bool> {
        let Some(task) = self.tasks.iter().find(|task| task.id == id).cloned() else {
            debug!(id = %id, "edit target not in view");
            return Ok(false);
        };

        self.form.fill_from(&task);
        match self.edit_mode {
            EditMode::InPlace => {
                self.editing = Some(id);
            }
            EditMode::Replace => {
                self.editing = None;
                store.delete(id)?;
                self.reload(store)?;
            }
        }
        Ok(true)
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
        self.form = TaskForm::default();
    }

    #[instrument(skip(self, store))]
    pub fn delete(&mut self, store: &mut TaskStore, id: TaskId) -> anyhow::Result<Option<Task>> {
        let removed = store.delete(id)?;
        if self.editing == Some(id) {
            self.cancel_edit();
        }
        self.reload(store)?;
        Ok(removed)
    }

    #[instrument(skip(self, store, now))]
    pub fn toggle_complete(
        &mut self,
        store: &mut TaskStore,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Task>> {
        let toggled = store.toggle_complete(id, now)?;
        self.reload(store)?;
        Ok(toggled)
    }

    fn reload(&mut self, store: &TaskStore) -> anyhow::Result<()> {
        self.tasks = store.load()?;
        Ok(())
    }

    pub fn render(&self) -> TaskListModel {
        let cards: Vec<TaskCard> = self
            .filtered()
            .into_iter()
            .map(|task| TaskCard {
                id: task.id,
                title: task.title.clone(),
                description: task.description.clone(),
                priority: task.priority,
                priority_badge: task.priority.badge(),
                status: task.status,
                status_label: task.status.label(),
                created: task
                    .date_created
                    .with_timezone(&self.tz)
                    .format("%Y-%m-%d")
                    .to_string(),
                action_label: if task.is_completed() { "Reopen" } else { "Complete" },
            })
            .collect();

        TaskListModel {
            empty_message: cards.is_empty().then_some(NO_TASKS_MESSAGE),
            cards,
            progress: self.progress(),
        }
    }
}

impl TaskObserver for TaskListView {
    fn observer_name(&self) -> &'static str {
        "task-list"
    }

    fn tasks_changed(&mut self, tasks: &[Task]) {
        self.tasks = tasks.to_vec();
        if let Some(id) = self.editing
            && !self.tasks.iter().any(|task| task.id == id)
        {
            debug!(id = %id, "edited task removed elsewhere; dropping edit session");
            self.editing = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::storage::MemoryStorage;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    fn setup(edit_mode: EditMode) -> (TaskStore, TaskListView) {
        let store = TaskStore::new(Box::new(MemoryStorage::new()));
        let view = TaskListView::new(Vec::new(), edit_mode, chrono_tz::UTC);
        (store, view)
    }

    fn add(view: &mut TaskListView, store: &mut TaskStore, title: &str, p: Priority, s: Status) -> Task {
        let form = view.form_mut();
        form.title = title.to_string();
        form.priority = p;
        form.status = s;
        view.submit(store, now()).expect("submit")
    }

    #[test]
    fn submit_creates_and_resets_form() {
        let (mut store, mut view) = setup(EditMode::InPlace);
        view.form_mut().title = "Write report".to_string();
        view.form_mut().description = "quarterly".to_string();

        let task = view.submit(&mut store, now()).expect("submit");
        assert_eq!(task.title, "Write report");
        assert_eq!(view.form(), &TaskForm::default());
        assert_eq!(view.tasks().len(), 1);
    }

    #[test]
    fn empty_titles_are_accepted() {
        let (mut store, mut view) = setup(EditMode::InPlace);
        let task = view.submit(&mut store, now()).expect("submit");
        assert_eq!(task.title, "");
        assert_eq!(store.load().expect("load").len(), 1);
    }

    #[test]
    fn filters_combine_priority_and_status() {
        let (mut store, mut view) = setup(EditMode::InPlace);
        let combos: Vec<(Priority, Status)> = Priority::ALL
            .iter()
            .flat_map(|p| Status::ALL.iter().map(move |s| (*p, *s)))
            .collect();
        for (i, (p, s)) in combos.iter().enumerate() {
            add(&mut view, &mut store, &format!("t{i}"), *p, *s);
        }

        let priority_options = std::iter::once(PriorityFilter::All)
            .chain(Priority::ALL.iter().map(|p| PriorityFilter::Only(*p)));
        for pf in priority_options {
            let status_options = std::iter::once(StatusFilter::All)
                .chain(Status::ALL.iter().map(|s| StatusFilter::Only(*s)));
            for sf in status_options {
                view.set_priority_filter(pf);
                view.set_status_filter(sf);

                let expected: Vec<TaskId> = view
                    .tasks()
                    .iter()
                    .filter(|t| pf.matches(t.priority) && sf.matches(t.status))
                    .map(|t| t.id)
                    .collect();
                let actual: Vec<TaskId> = view.filtered().iter().map(|t| t.id).collect();
                assert_eq!(actual, expected, "priority {pf:?} status {sf:?}");
            }
        }

        view.set_priority_filter(PriorityFilter::All);
        view.set_status_filter(StatusFilter::All);
        assert_eq!(view.filtered().len(), 9);
        view.set_priority_filter(PriorityFilter::Only(Priority::High));
        view.set_status_filter(StatusFilter::Only(Status::Completed));
        assert_eq!(view.filtered().len(), 1);
    }

    #[test]
    fn progress_rounds_to_nearest_percent() {
        assert_eq!(Progress::of(&[]).percentage, 0);

        let (mut store, mut view) = setup(EditMode::InPlace);
        add(&mut view, &mut store, "a", Priority::Low, Status::Completed);
        add(&mut view, &mut store, "b", Priority::Low, Status::Completed);
        add(&mut view, &mut store, "c", Priority::Low, Status::Todo);

        let progress = view.progress();
        assert_eq!(progress.total, 3);
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.percentage, 67);

        add(&mut view, &mut store, "d", Priority::Low, Status::InProgress);
        add(&mut view, &mut store, "e", Priority::Low, Status::Todo);
        add(&mut view, &mut store, "f", Priority::Low, Status::Todo);
        add(&mut view, &mut store, "g", Priority::Low, Status::Todo);
        add(&mut view, &mut store, "h", Priority::Low, Status::Todo);
        // 2 of 8
        assert_eq!(view.progress().percentage, 25);
    }

    #[test]
    fn in_place_edit_keeps_id_and_cancel_restores_nothing_lost() {
        let (mut store, mut view) = setup(EditMode::InPlace);
        let task = add(&mut view, &mut store, "draft", Priority::Medium, Status::Todo);

        assert!(view.begin_edit(&mut store, task.id).expect("edit"));
        assert_eq!(view.form().title, "draft");
        assert_eq!(view.form().priority, Priority::Medium);
        view.cancel_edit();
        assert_eq!(store.load().expect("load"), vec![task.clone()]);

        assert!(view.begin_edit(&mut store, task.id).expect("edit"));
        view.form_mut().title = "final".to_string();
        let edited = view
            .submit(&mut store, now() + Duration::minutes(1))
            .expect("submit");
        assert_eq!(edited.id, task.id);
        assert_eq!(edited.title, "final");
        assert_eq!(edited.date_created, task.date_created);
        assert_eq!(store.load().expect("load").len(), 1);
        assert_eq!(view.editing(), None);
    }

    #[test]
    fn replace_edit_deletes_immediately() {
        let (mut store, mut view) = setup(EditMode::Replace);
        let task = add(&mut view, &mut store, "draft", Priority::High, Status::InProgress);

        assert!(view.begin_edit(&mut store, task.id).expect("edit"));
        assert!(store.load().expect("load").is_empty());
        assert_eq!(view.form().status, Status::InProgress);

        let recreated = view.submit(&mut store, now()).expect("submit");
        assert_ne!(recreated.id, task.id);
        assert_eq!(recreated.title, "draft");
    }

    #[test]
    fn render_shows_badges_and_empty_message() {
        let (mut store, mut view) = setup(EditMode::InPlace);
        let empty = view.render();
        assert_eq!(empty.empty_message, Some(NO_TASKS_MESSAGE));

        let task = add(&mut view, &mut store, "ship", Priority::High, Status::InProgress);
        let model = view.render();
        assert_eq!(model.empty_message, None);
        assert_eq!(model.cards[0].priority_badge, "High Priority");
        assert_eq!(model.cards[0].status_label, "In Progress");
        assert_eq!(model.cards[0].action_label, "Complete");
        assert_eq!(model.cards[0].created, "2026-10-18");

        view.toggle_complete(&mut store, task.id, now()).expect("toggle");
        assert_eq!(view.render().cards[0].action_label, "Reopen");
    }
}
