use std::collections::VecDeque;

use crate::task::{Task, TaskId};

/// A mutation the task store committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Created(TaskId),
    Updated(TaskId),
    Deleted(TaskId),
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Created(id) | TaskEvent::Updated(id) | TaskEvent::Deleted(id) => *id,
        }
    }
}

/// Events waiting to be broadcast, oldest first.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<TaskEvent>,
}

impl Outbox {
    pub fn emit(&mut self, event: TaskEvent) {
        tracing::trace!(?event, "queued task event");
        self.queue.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<TaskEvent> {
        self.queue.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// A view that reloads and re-renders whenever the task collection changes.
pub trait TaskObserver {
    fn observer_name(&self) -> &'static str;

    /// Receives the full, freshly loaded collection.
    fn tasks_changed(&mut self, tasks: &[Task]);
}

/// Hands the same snapshot to every observer, in order.
pub fn broadcast(observers: &mut [&mut dyn TaskObserver], tasks: &[Task]) {
    for observer in observers.iter_mut() {
        tracing::debug!(
            observer = observer.observer_name(),
            count = tasks.len(),
            "notifying observer"
        );
        observer.tasks_changed(tasks);
    }
}
