use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::events::{Outbox, TaskEvent};
use crate::storage::Storage;
use crate::task::{Task, TaskDraft, TaskId, TaskPatch};

pub const TASKS_KEY: &str = "tasks";

/// Owns the canonical task collection under the `tasks` storage key.
///
/// Every operation is a whole-collection read-modify-write ending in a single
/// storage write, so callers never observe a partially applied mutation.
pub struct TaskStore {
    storage: Box<dyn Storage>,
    outbox: Outbox,
    last_issued: u64,
}

impl TaskStore {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            storage,
            outbox: Outbox::default(),
            last_issued: 0,
        }
    }

    /// Full ordered collection. Absent, unparseable, or non-array contents read
    /// as empty; individual records that do not decode are skipped.
    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> anyhow::Result<Vec<Task>> {
        let Some(raw) = self.storage.get_item(TASKS_KEY)? else {
            debug!("no stored tasks");
            return Ok(Vec::new());
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "stored tasks are not valid JSON; treating as empty");
                return Ok(Vec::new());
            }
        };

        let Value::Array(items) = value else {
            warn!("stored tasks are not a JSON array; treating as empty");
            return Ok(Vec::new());
        };

        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<Task>(item) {
                Ok(task) => out.push(task),
                Err(err) => warn!(index = idx, error = %err, "skipping malformed task record"),
            }
        }

        debug!(count = out.len(), "loaded tasks");
        Ok(out)
    }

    #[tracing::instrument(skip(self, tasks), fields(count = tasks.len()))]
    pub fn save(&mut self, tasks: &[Task]) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(tasks).context("failed to serialize tasks")?;
        self.storage
            .set_item(TASKS_KEY, &serialized)
            .context("failed to save tasks")
    }

    pub fn get(&self, id: TaskId) -> anyhow::Result<Option<Task>> {
        Ok(self.load()?.into_iter().find(|task| task.id == id))
    }

    /// Millisecond timestamp ids, bumped past anything already issued or stored.
    pub fn next_id(&self, tasks: &[Task], now: DateTime<Utc>) -> TaskId {
        let clock = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let stored_max = tasks.iter().map(|t| t.id.0).max().unwrap_or(0);
        let floor = stored_max.max(self.last_issued).saturating_add(1);
        TaskId(clock.max(floor))
    }

    #[tracing::instrument(skip(self, draft, now), fields(title = %draft.title))]
    pub fn create(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> anyhow::Result<Task> {
        let mut tasks = self.load()?;
        let id = self.next_id(&tasks, now);
        let task = Task::from_draft(id, draft, now);

        tasks.push(task.clone());
        self.save(&tasks)?;
        self.last_issued = id.0;
        self.outbox.emit(TaskEvent::Created(id));

        info!(id = %id, count = tasks.len(), "task created");
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch, now), fields(id = %id))]
    pub fn update(
        &mut self,
        id: TaskId,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Task>> {
        let mut tasks = self.load()?;
        let Some(task) = tasks.iter_mut().find(|task| task.id == id) else {
            debug!("update target not found");
            return Ok(None);
        };

        task.apply_patch(patch);
        task.date_modified = now;
        let updated = task.clone();

        self.save(&tasks)?;
        self.outbox.emit(TaskEvent::Updated(id));

        info!(status = updated.status.as_key(), scheduled = updated.is_scheduled(), "task updated");
        Ok(Some(updated))
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    pub fn delete(&mut self, id: TaskId) -> anyhow::Result<Option<Task>> {
        let mut tasks = self.load()?;
        let Some(idx) = tasks.iter().position(|task| task.id == id) else {
            debug!("delete target not found");
            return Ok(None);
        };

        let removed = tasks.remove(idx);
        self.save(&tasks)?;
        self.outbox.emit(TaskEvent::Deleted(id));

        info!(count = tasks.len(), "task deleted");
        Ok(Some(removed))
    }

    /// Flips between completed and todo.
    pub fn toggle_complete(
        &mut self,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Task>> {
        let Some(current) = self.get(id)? else {
            return Ok(None);
        };
        self.update(id, TaskPatch::status(current.status.toggled()), now)
    }

    pub fn take_events(&mut self) -> Vec<TaskEvent> {
        self.outbox.drain()
    }

    pub fn has_pending_events(&self) -> bool {
        !self.outbox.is_empty()
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::storage::MemoryStorage;
    use crate::task::{Priority, Status};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0)
            .single()
            .expect("valid now")
    }

    fn store_with(raw: Option<&str>) -> TaskStore {
        let mut storage = MemoryStorage::new();
        if let Some(raw) = raw {
            storage.set_item(TASKS_KEY, raw).expect("seed storage");
        }
        TaskStore::new(Box::new(storage))
    }

    #[test]
    fn malformed_contents_load_as_empty() {
        assert!(store_with(None).load().expect("absent").is_empty());
        assert!(store_with(Some("{not json")).load().expect("invalid").is_empty());
        assert!(store_with(Some(r#"{"id": 1}"#)).load().expect("object").is_empty());
        assert!(store_with(Some("null")).load().expect("null").is_empty());
    }

    #[test]
    fn undecodable_records_are_skipped() {
        let raw = r#"[
            {"id": 1, "title": "ok", "dateCreated": "2026-10-18T09:00:00.000Z",
             "dateModified": "2026-10-18T09:00:00.000Z"},
            {"title": "missing id"},
            {"id": 2, "title": "bad priority", "priority": "urgent",
             "dateCreated": "2026-10-18T09:00:00.000Z",
             "dateModified": "2026-10-18T09:00:00.000Z"}
        ]"#;
        let tasks = store_with(Some(raw)).load().expect("load");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "ok");
    }

    #[test]
    fn records_without_a_title_key_are_skipped() {
        let raw = r#"[
            {"id": 1, "dateCreated": "2026-10-18T09:00:00.000Z",
             "dateModified": "2026-10-18T09:00:00.000Z"},
            {"id": 2, "title": "", "dateCreated": "2026-10-18T09:00:00.000Z",
             "dateModified": "2026-10-18T09:00:00.000Z"}
        ]"#;
        let tasks = store_with(Some(raw)).load().expect("load");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, TaskId(2));
        assert_eq!(tasks[0].title, "");
    }

    #[test]
    fn create_assigns_defaults_and_appends() {
        let mut store = store_with(None);
        let task = store.create(TaskDraft::titled("A"), now()).expect("create");

        assert_eq!(task.id, TaskId(now().timestamp_millis() as u64));
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.status, Status::Todo);
        assert_eq!(task.date, None);
        assert_eq!(task.date_created, now());
        assert_eq!(task.date_modified, now());
        assert_eq!(store.load().expect("load"), vec![task.clone()]);
        assert_eq!(store.take_events(), vec![TaskEvent::Created(task.id)]);
    }

    #[test]
    fn ids_stay_unique_within_one_millisecond() {
        let mut store = store_with(None);
        let ids: HashSet<TaskId> = (0..50)
            .map(|i| {
                store
                    .create(TaskDraft::titled(format!("t{i}")), now())
                    .expect("create")
                    .id
            })
            .collect();
        assert_eq!(ids.len(), 50);

        let loaded = store.load().expect("load");
        assert!(loaded.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    #[test]
    fn ids_never_go_backwards_after_clock_skew() {
        let mut store = store_with(None);
        let first = store.create(TaskDraft::titled("a"), now()).expect("create");
        let second = store
            .create(TaskDraft::titled("b"), now() - Duration::hours(1))
            .expect("create");
        assert!(second.id > first.id);
    }

    #[test]
    fn update_bumps_modified_and_keeps_position() {
        let mut store = store_with(None);
        let a = store.create(TaskDraft::titled("a"), now()).expect("create");
        let b = store.create(TaskDraft::titled("b"), now()).expect("create");
        store.take_events();

        let later = now() + Duration::minutes(5);
        let updated = store
            .update(a.id, TaskPatch::status(Status::InProgress), later)
            .expect("update")
            .expect("task exists");
        assert_eq!(updated.status, Status::InProgress);
        assert_eq!(updated.date_modified, later);
        assert_eq!(updated.date_created, now());

        let order: Vec<TaskId> = store.load().expect("load").iter().map(|t| t.id).collect();
        assert_eq!(order, vec![a.id, b.id]);
        assert_eq!(store.take_events(), vec![TaskEvent::Updated(a.id)]);
    }

    #[test]
    fn missing_ids_are_noops() {
        let mut store = store_with(None);
        assert!(store.update(TaskId(9), TaskPatch::default(), now()).expect("update").is_none());
        assert!(store.delete(TaskId(9)).expect("delete").is_none());
        assert!(store.toggle_complete(TaskId(9), now()).expect("toggle").is_none());
        assert!(!store.has_pending_events());
        assert_eq!(store.storage().get_item(TASKS_KEY).expect("get"), None);
    }

    #[test]
    fn delete_removes_only_the_target() {
        let mut store = store_with(None);
        let a = store.create(TaskDraft::titled("a"), now()).expect("create");
        let b = store.create(TaskDraft::titled("b"), now()).expect("create");

        let removed = store.delete(a.id).expect("delete").expect("existed");
        assert_eq!(removed.id, a.id);
        assert_eq!(store.load().expect("load"), vec![b]);
    }

    #[test]
    fn toggle_alternates_between_completed_and_todo() {
        let mut store = store_with(None);
        let draft = TaskDraft {
            status: Status::Completed,
            ..TaskDraft::titled("done already")
        };
        let task = store.create(draft, now()).expect("create");

        let once = store.toggle_complete(task.id, now()).expect("toggle").expect("exists");
        assert_eq!(once.status, Status::Todo);
        let twice = store.toggle_complete(task.id, now()).expect("toggle").expect("exists");
        assert_eq!(twice.status, Status::Completed);
    }
}
