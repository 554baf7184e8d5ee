use anyhow::anyhow;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use crate::datetime::{
    format_clock, format_hour, local_midnight, local_to_utc, parse_clock_time, to_local_date,
    to_local_hour,
};
use crate::events::TaskObserver;
use crate::store::TaskStore;
use crate::task::{Priority, Task, TaskId, TaskPatch};

pub const DAYS_PER_WEEK: u32 = 7;
pub const HOURS_PER_DAY: u32 = 24;
pub const SLOT_COUNT: usize = (DAYS_PER_WEEK * HOURS_PER_DAY) as usize;

/// Most recent Sunday on or before `reference`.
pub fn start_of_week(reference: NaiveDate) -> NaiveDate {
    let back = i64::from(reference.weekday().num_days_from_sunday());
    reference - Duration::days(back)
}

/// Grid cells are laid out hour-major: one row of seven days per hour.
pub fn slot_index(day_offset: u32, hour: u32) -> usize {
    (day_offset + hour * DAYS_PER_WEEK) as usize
}

/// The visible week as local dates and as the instant range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRange {
    pub start_date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WeekRange {
    pub fn containing(reference: NaiveDate, tz: &Tz) -> anyhow::Result<Self> {
        let start_date = start_of_week(reference);
        let end_date = start_date + Duration::days(i64::from(DAYS_PER_WEEK));
        Ok(Self {
            start_date,
            start: local_midnight(start_date, tz)?,
            end: local_midnight(end_date, tz)?,
        })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn day(&self, offset: u32) -> NaiveDate {
        self.start_date + Duration::days(i64::from(offset))
    }

    /// Grid slot for an instant, or `None` when it falls outside this week.
    pub fn slot_for(&self, instant: DateTime<Utc>, tz: &Tz) -> Option<usize> {
        if !self.contains(instant) {
            return None;
        }
        let offset = (to_local_date(instant, tz) - self.start_date).num_days();
        let offset = u32::try_from(offset).ok().filter(|d| *d < DAYS_PER_WEEK)?;
        let slot = slot_index(offset, to_local_hour(instant, tz));
        (slot < SLOT_COUNT).then_some(slot)
    }

    /// `Oct 11, 2026 - Oct 17, 2026`
    pub fn label(&self) -> String {
        let last = self.day(DAYS_PER_WEEK - 1);
        format!(
            "{} - {}",
            self.start_date.format("%b %-d, %Y"),
            last.format("%b %-d, %Y")
        )
    }
}

/// A drop waiting on the time prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDrop {
    pub task_id: TaskId,
    pub date: NaiveDate,
    pub hour: u32,
    pub time_input: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DropState {
    #[default]
    Idle,
    PendingConfirmation(PendingDrop),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarCard {
    pub id: TaskId,
    pub title: String,
    pub priority: Priority,
    pub time_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayHeader {
    pub date: NaiveDate,
    pub weekday: String,
    pub day: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarModel {
    pub week: WeekRange,
    pub week_label: String,
    pub day_headers: Vec<DayHeader>,
    pub hour_labels: Vec<String>,
    /// `SLOT_COUNT` cells indexed by [`slot_index`].
    pub slots: Vec<Vec<CalendarCard>>,
    pub unscheduled: Vec<CalendarCard>,
}

impl CalendarModel {
    pub fn scheduled_ids(&self) -> Vec<TaskId> {
        self.slots.iter().flatten().map(|card| card.id).collect()
    }

    pub fn slot_of(&self, id: TaskId) -> Option<usize> {
        self.slots
            .iter()
            .position(|cell| cell.iter().any(|card| card.id == id))
    }

    pub fn is_unscheduled(&self, id: TaskId) -> bool {
        self.unscheduled.iter().any(|card| card.id == id)
    }
}

/// Seven-day by 24-hour scheduling grid over the shared task collection.
#[derive(Debug)]
pub struct CalendarView {
    tasks: Vec<Task>,
    reference: NaiveDate,
    tz: Tz,
    dragged: Option<TaskId>,
    state: DropState,
}

impl CalendarView {
    pub fn new(tasks: Vec<Task>, reference: NaiveDate, tz: Tz) -> Self {
        debug!(count = tasks.len(), %reference, "mounted calendar view");
        Self {
            tasks,
            reference,
            tz,
            dragged: None,
            state: DropState::Idle,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn reference(&self) -> NaiveDate {
        self.reference
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn week(&self) -> anyhow::Result<WeekRange> {
        WeekRange::containing(self.reference, &self.tz)
    }

    pub fn next_week(&mut self) {
        self.reference += Duration::days(i64::from(DAYS_PER_WEEK));
    }

    pub fn previous_week(&mut self) {
        self.reference -= Duration::days(i64::from(DAYS_PER_WEEK));
    }

    pub fn go_to(&mut self, reference: NaiveDate) {
        self.reference = reference;
    }

    pub fn state(&self) -> &DropState {
        &self.state
    }

    pub fn dragged(&self) -> Option<TaskId> {
        self.dragged
    }

    pub fn drag_start(&mut self, id: TaskId) -> bool {
        if !self.tasks.iter().any(|task| task.id == id) {
            debug!(id = %id, "drag start ignored for unknown task");
            return false;
        }
        debug!(id = %id, "calendar drag start");
        self.dragged = Some(id);
        true
    }

    pub fn drag_end(&mut self) {
        debug!("calendar drag end");
        self.dragged = None;
    }

    /// Drop the dragged task on the cell `(day, hour)` of the visible week and
    /// open the time prompt at `hour:00`.
    #[instrument(skip(self))]
    pub fn drop_on(&mut self, day: u32, hour: u32) -> anyhow::Result<bool> {
        let Some(task_id) = self.dragged else {
            debug!("drop without a dragged task");
            return Ok(false);
        };
        if day >= DAYS_PER_WEEK || hour >= HOURS_PER_DAY {
            warn!(day, hour, "drop outside the grid");
            return Ok(false);
        }

        let date = self.week()?.day(day);
        self.state = DropState::PendingConfirmation(PendingDrop {
            task_id,
            date,
            hour,
            time_input: format!("{hour:02}:00"),
        });
        debug!(id = %task_id, %date, hour, "awaiting time confirmation");
        Ok(true)
    }

    pub fn set_time_input(&mut self, input: &str) -> bool {
        match &mut self.state {
            DropState::PendingConfirmation(pending) => {
                pending.time_input = input.to_string();
                true
            }
            DropState::Idle => false,
        }
    }

    /// Commits the pending drop. An empty or unreadable time keeps the prompt
    /// open and returns `Ok(None)`.
    #[instrument(skip(self, store, now))]
    pub fn confirm(
        &mut self,
        store: &mut TaskStore,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Task>> {
        let DropState::PendingConfirmation(pending) = &self.state else {
            debug!("confirm with nothing pending");
            return Ok(None);
        };

        let input = pending.time_input.trim();
        if input.is_empty() {
            debug!("confirm with empty time; prompt stays open");
            return Ok(None);
        }
        let Some((hour, minute)) = parse_clock_time(input) else {
            warn!(input = %input, "unreadable time input; prompt stays open");
            return Ok(None);
        };

        let local = pending
            .date
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(|| anyhow!("invalid time {hour:02}:{minute:02}"))?;
        let scheduled = local_to_utc(local, &self.tz, "scheduled drop")?;
        let task_id = pending.task_id;

        self.state = DropState::Idle;
        let updated = store.update(task_id, TaskPatch::schedule(scheduled), now)?;
        match &updated {
            Some(task) => info!(id = %task.id, date = %scheduled, "task scheduled"),
            None => warn!(id = %task_id, "scheduled task no longer exists"),
        }
        self.tasks = store.load()?;
        Ok(updated)
    }

    pub fn cancel(&mut self) {
        if self.state != DropState::Idle {
            debug!("time prompt cancelled");
        }
        self.state = DropState::Idle;
    }

    /// Moves a task back to the unscheduled list.
    #[instrument(skip(self, store, now))]
    pub fn unschedule(
        &mut self,
        store: &mut TaskStore,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Task>> {
        let updated = store.update(id, TaskPatch::unschedule(), now)?;
        if updated.is_some() {
            info!(id = %id, "task unscheduled");
        }
        self.tasks = store.load()?;
        Ok(updated)
    }

    /// Rebuilds the whole grid and the unscheduled list from the cached tasks.
    pub fn render(&self) -> anyhow::Result<CalendarModel> {
        let week = self.week()?;

        let day_headers = (0..DAYS_PER_WEEK)
            .map(|offset| {
                let date = week.day(offset);
                DayHeader {
                    date,
                    weekday: date.format("%a").to_string(),
                    day: date.day(),
                }
            })
            .collect();
        let hour_labels = (0..HOURS_PER_DAY).map(format_hour).collect();

        let mut slots: Vec<Vec<CalendarCard>> = vec![Vec::new(); SLOT_COUNT];
        let mut unscheduled = Vec::new();

        for task in &self.tasks {
            match task.date {
                Some(date) => {
                    if let Some(slot) = week.slot_for(date, &self.tz) {
                        slots[slot].push(self.card(task, Some(date)));
                    }
                }
                None => unscheduled.push(self.card(task, None)),
            }
        }

        Ok(CalendarModel {
            week,
            week_label: week.label(),
            day_headers,
            hour_labels,
            slots,
            unscheduled,
        })
    }

    fn card(&self, task: &Task, date: Option<DateTime<Utc>>) -> CalendarCard {
        CalendarCard {
            id: task.id,
            title: task.title.clone(),
            priority: task.priority,
            time_label: date.map(|date| format_clock(date, &self.tz)),
        }
    }
}

impl TaskObserver for CalendarView {
    fn observer_name(&self) -> &'static str {
        "calendar"
    }

    fn tasks_changed(&mut self, tasks: &[Task]) {
        self.tasks = tasks.to_vec();
        if let Some(id) = self.dragged
            && !self.tasks.iter().any(|task| task.id == id)
        {
            self.dragged = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::events::TaskEvent;
    use crate::storage::MemoryStorage;
    use crate::task::TaskDraft;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 8, 0, 0)
            .single()
            .expect("valid now")
    }

    fn setup(tz: Tz) -> (TaskStore, CalendarView, Task) {
        let mut store = TaskStore::new(Box::new(MemoryStorage::new()));
        let task = store.create(TaskDraft::titled("A"), now()).expect("create");
        let view = CalendarView::new(store.load().expect("load"), date(2026, 10, 14), tz);
        (store, view, task)
    }

    #[test]
    fn week_starts_on_sunday() {
        assert_eq!(start_of_week(date(2026, 10, 14)), date(2026, 10, 11));
        assert_eq!(start_of_week(date(2026, 10, 11)), date(2026, 10, 11));
        assert_eq!(start_of_week(date(2026, 10, 17)), date(2026, 10, 11));

        let week = WeekRange::containing(date(2026, 10, 14), &chrono_tz::UTC).expect("week");
        assert_eq!(week.label(), "Oct 11, 2026 - Oct 17, 2026");
        assert_eq!(week.end - week.start, Duration::days(7));
    }

    #[test]
    fn places_tasks_by_day_plus_hour_times_seven() {
        let tz = chrono_tz::UTC;
        let week = WeekRange::containing(date(2026, 10, 14), &tz).expect("week");
        let at = week.start + Duration::days(2) + Duration::hours(14);
        assert_eq!(week.slot_for(at, &tz), Some(100));
        assert_eq!(week.slot_for(week.start, &tz), Some(0));
        assert_eq!(week.slot_for(week.end - Duration::minutes(1), &tz), Some(167));
        assert_eq!(week.slot_for(week.end, &tz), None);
        assert_eq!(week.slot_for(week.start - Duration::seconds(1), &tz), None);
    }

    #[test]
    fn out_of_week_tasks_are_neither_grid_nor_unscheduled() {
        let (mut store, mut view, task) = setup(chrono_tz::UTC);
        let next_month = Utc
            .with_ymd_and_hms(2026, 11, 20, 10, 0, 0)
            .single()
            .expect("valid");
        store
            .update(task.id, TaskPatch::schedule(next_month), now())
            .expect("update");
        view.tasks_changed(&store.load().expect("load"));

        let model = view.render().expect("render");
        assert!(model.scheduled_ids().is_empty());
        assert!(model.unscheduled.is_empty());
    }

    #[test]
    fn new_task_is_unscheduled() {
        let (_store, view, task) = setup(chrono_tz::UTC);
        let model = view.render().expect("render");
        assert!(model.is_unscheduled(task.id));
        assert_eq!(model.slot_of(task.id), None);
        assert_eq!(model.slots.len(), SLOT_COUNT);
        assert_eq!(model.hour_labels[0], "12AM");
        assert_eq!(model.day_headers[0].weekday, "Sun");
        assert_eq!(model.day_headers[0].day, 11);
    }

    #[test]
    fn drag_drop_confirm_schedules_task() {
        let (mut store, mut view, task) = setup(chrono_tz::UTC);

        assert!(view.drag_start(task.id));
        // Tuesday is day offset 2 in a Sunday-first week.
        assert!(view.drop_on(2, 9).expect("drop"));
        view.drag_end();
        match view.state() {
            DropState::PendingConfirmation(pending) => {
                assert_eq!(pending.time_input, "09:00");
                assert_eq!(pending.date, date(2026, 10, 13));
            }
            DropState::Idle => panic!("expected pending confirmation"),
        }

        assert!(view.set_time_input("09:30"));
        let scheduled = view
            .confirm(&mut store, now())
            .expect("confirm")
            .expect("task updated");
        assert_eq!(
            scheduled.date,
            Utc.with_ymd_and_hms(2026, 10, 13, 9, 30, 0).single()
        );
        assert_eq!(view.state(), &DropState::Idle);

        let model = view.render().expect("render");
        assert_eq!(model.slot_of(task.id), Some(2 + 9 * 7));
        assert!(!model.is_unscheduled(task.id));
        let card = &model.slots[2 + 9 * 7][0];
        assert_eq!(card.time_label.as_deref(), Some("9:30 AM"));
    }

    #[test]
    fn drop_without_drag_is_noop() {
        let (_store, mut view, _task) = setup(chrono_tz::UTC);
        assert!(!view.drop_on(1, 1).expect("drop"));
        assert_eq!(view.state(), &DropState::Idle);
        assert!(!view.drag_start(TaskId(1)));
    }

    #[test]
    fn empty_time_keeps_prompt_open_and_cancel_discards() {
        let (mut store, mut view, task) = setup(chrono_tz::UTC);
        view.drag_start(task.id);
        view.drop_on(3, 15).expect("drop");

        view.set_time_input("");
        assert!(view.confirm(&mut store, now()).expect("confirm").is_none());
        assert!(matches!(view.state(), DropState::PendingConfirmation(_)));

        view.set_time_input("not a time");
        assert!(view.confirm(&mut store, now()).expect("confirm").is_none());
        assert!(matches!(view.state(), DropState::PendingConfirmation(_)));

        view.cancel();
        assert_eq!(view.state(), &DropState::Idle);
        assert_eq!(store.get(task.id).expect("get").expect("exists").date, None);
        assert_eq!(store.take_events(), vec![TaskEvent::Created(task.id)]);
    }

    #[test]
    fn week_navigation_round_trips() {
        let (_store, mut view, _task) = setup(chrono_tz::UTC);
        let original = view.week().expect("week").start_date;
        view.next_week();
        assert_eq!(view.week().expect("week").start_date, date(2026, 10, 18));
        view.previous_week();
        assert_eq!(view.week().expect("week").start_date, original);
    }

    #[test]
    fn render_replaces_previous_output() {
        let (mut store, mut view, task) = setup(chrono_tz::UTC);
        let first = view.render().expect("render");
        let second = view.render().expect("render");
        assert_eq!(first, second);
        assert_eq!(second.unscheduled.len(), 1);

        store.delete(task.id).expect("delete");
        view.tasks_changed(&store.load().expect("load"));
        let third = view.render().expect("render");
        assert!(third.unscheduled.is_empty());
    }

    #[test]
    fn local_timezone_drives_day_and_hour() {
        let tz = chrono_tz::America::New_York;
        let (mut store, mut view, task) = setup(tz);
        // 02:30 UTC Wednesday is 22:30 Tuesday in New York.
        let at = Utc
            .with_ymd_and_hms(2026, 10, 14, 2, 30, 0)
            .single()
            .expect("valid");
        store.update(task.id, TaskPatch::schedule(at), now()).expect("update");
        view.tasks_changed(&store.load().expect("load"));

        let model = view.render().expect("render");
        assert_eq!(model.slot_of(task.id), Some(2 + 22 * 7));
    }

    #[test]
    fn nonexistent_local_time_is_rejected() {
        let tz = chrono_tz::America::New_York;
        let mut store = TaskStore::new(Box::new(MemoryStorage::new()));
        let task = store.create(TaskDraft::titled("A"), now()).expect("create");
        let mut view = CalendarView::new(store.load().expect("load"), date(2026, 3, 8), tz);

        view.drag_start(task.id);
        view.drop_on(0, 2).expect("drop");
        view.set_time_input("02:30");
        assert!(view.confirm(&mut store, now()).is_err());
        assert!(matches!(view.state(), DropState::PendingConfirmation(_)));

        view.set_time_input("03:30");
        let scheduled = view.confirm(&mut store, now()).expect("confirm").expect("updated");
        assert_eq!(
            scheduled.date,
            Utc.with_ymd_and_hms(2026, 3, 8, 7, 30, 0).single()
        );
    }
}
