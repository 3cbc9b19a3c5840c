//! Single-flight guard for crawl and resolve tasks
//!
//! At most one task runs at a time. A second request while one is active is
//! refused, never queued.

use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// What the running task is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Crawl,
    Resolve,
    Sync,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Crawl => "crawl",
            Self::Resolve => "resolve",
            Self::Sync => "sync",
        };
        f.write_str(s)
    }
}

/// The task currently holding the lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTask {
    pub channel: String,
    pub kind: TaskKind,
}

impl fmt::Display for ActiveTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.kind, self.channel)
    }
}

/// Lock shared by everything that starts tasks
#[derive(Debug, Clone)]
pub struct TaskLock {
    semaphore: Arc<Semaphore>,
    active: Arc<Mutex<Option<ActiveTask>>>,
}

impl TaskLock {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Claims the lock, or returns the task that already holds it
    pub fn try_acquire(&self, channel: &str, kind: TaskKind) -> Result<TaskPermit, ActiveTask> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                let task = ActiveTask {
                    channel: channel.to_string(),
                    kind,
                };
                *self.slot() = Some(task);
                Ok(TaskPermit {
                    _permit: permit,
                    active: Arc::clone(&self.active),
                })
            }
            Err(_) => Err(self.current().unwrap_or(ActiveTask {
                channel: channel.to_string(),
                kind,
            })),
        }
    }

    /// The running task, if any
    pub fn current(&self) -> Option<ActiveTask> {
        self.slot().clone()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ActiveTask>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TaskLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of a task; releases the lock on drop
#[derive(Debug)]
pub struct TaskPermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<Mutex<Option<ActiveTask>>>,
}

impl Drop for TaskPermit {
    fn drop(&mut self) {
        // Cleared before the semaphore permit field is dropped
        *self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
