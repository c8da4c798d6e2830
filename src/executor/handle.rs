/*!
 * Completion Handles
 *
 * A `WorkItem` is one submitted task plus its outcome slot. The pool keeps
 * one reference to run it; the submitter keeps another inside a
 * `CompletionHandle` to wait on, inspect or cancel it.
 */

use super::panic_message;
use crate::core::errors::{SyncError, SyncResult};
use crate::core::sync::deadline::{self, Deadline};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Task accepted by `ThreadPool<T>`
pub(crate) type Task<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

/// Observable lifecycle of a submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued or handed to a worker, not started
    Pending,
    Running,
    Completed,
    /// Returned an error or panicked
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

enum ItemState<T> {
    Pending(Task<T>),
    Running,
    Done(T),
    Failed(SyncError),
    Cancelled,
}

impl<T> ItemState<T> {
    fn status(&self) -> TaskStatus {
        match self {
            ItemState::Pending(_) => TaskStatus::Pending,
            ItemState::Running => TaskStatus::Running,
            ItemState::Done(_) => TaskStatus::Completed,
            ItemState::Failed(_) => TaskStatus::Failed,
            ItemState::Cancelled => TaskStatus::Cancelled,
        }
    }
}

pub(crate) struct WorkItem<T> {
    state: Mutex<ItemState<T>>,
    settled: Condvar,
}

impl<T> WorkItem<T> {
    pub(crate) fn new(task: Task<T>) -> Self {
        Self {
            state: Mutex::new(ItemState::Pending(task)),
            settled: Condvar::new(),
        }
    }

    /// Run the task if it is still pending and return the settled status
    ///
    /// An item cancelled (or failed) before a worker got to it is left as is.
    pub(crate) fn run(&self) -> TaskStatus {
        let task = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, ItemState::Running) {
                ItemState::Pending(task) => task,
                other => {
                    let status = other.status();
                    *state = other;
                    return status;
                }
            }
        };

        let outcome = match catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(value)) => ItemState::Done(value),
            Ok(Err(err)) => ItemState::Failed(SyncError::task(err)),
            Err(payload) => {
                let message = panic_message(&*payload);
                warn!(panic = %message, "Task panicked");
                ItemState::Failed(SyncError::TaskPanicked(message))
            }
        };

        let status = outcome.status();
        *self.state.lock() = outcome;
        self.settled.notify_all();
        status
    }

    /// Settle a pending item with an error without running it
    pub(crate) fn fail(&self, err: SyncError) {
        let mut state = self.state.lock();
        if matches!(*state, ItemState::Pending(_)) {
            *state = ItemState::Failed(err);
            self.settled.notify_all();
        }
    }
}

/// Handle to the eventual outcome of a task submitted to `ThreadPool<T>`
pub struct CompletionHandle<T> {
    item: Arc<WorkItem<T>>,
}

impl<T> CompletionHandle<T> {
    pub(crate) fn new(item: Arc<WorkItem<T>>) -> Self {
        Self { item }
    }

    pub fn status(&self) -> TaskStatus {
        self.item.state.lock().status()
    }

    /// Whether the task has settled (completed, failed or cancelled)
    pub fn is_complete(&self) -> bool {
        matches!(
            self.status(),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Cancel the task if no worker has started it yet
    pub fn try_cancel(&self) -> bool {
        let mut state = self.item.state.lock();
        if !matches!(*state, ItemState::Pending(_)) {
            return false;
        }
        // Dropping the task here releases whatever it captured
        *state = ItemState::Cancelled;
        self.item.settled.notify_all();
        true
    }
}

impl<T: Clone> CompletionHandle<T> {
    /// Wait for the task's outcome
    ///
    /// `Ok(None)` means the timeout elapsed first. A task error surfaces as
    /// `TaskFailed`, a panic as `TaskPanicked`.
    pub fn get(&self, timeout: Option<Duration>) -> SyncResult<Option<T>> {
        let deadline = Deadline::start(timeout);
        let mut state = self.item.state.lock();

        loop {
            match &*state {
                ItemState::Done(value) => return Ok(Some(value.clone())),
                ItemState::Failed(err) => return Err(err.clone()),
                ItemState::Cancelled => return Err(SyncError::Cancelled),
                ItemState::Pending(_) | ItemState::Running => {}
            }
            if deadline.is_expired() {
                return Ok(None);
            }
            deadline::wait_until(&self.item.settled, &mut state, deadline);
        }
    }
}

impl<T> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            item: self.item.clone(),
        }
    }
}

impl<T> std::fmt::Debug for CompletionHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("status", &self.status())
            .finish()
    }
}
