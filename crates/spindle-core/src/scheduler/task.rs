//! Units of scheduled work.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;

type BeforeHook = Box<dyn FnOnce(&TaskInfo) + Send>;
type AfterHook = Box<dyn FnOnce(&TaskInfo, TaskOutcome) + Send>;

/// How a task left its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The future completed.
    Completed,
    /// The future panicked.
    Panicked,
    /// The future was dropped before completing (timeout or shutdown).
    Cancelled,
}

/// What the hooks of a task get to see.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    request_id: u64,
    scheduler: Arc<str>,
    submitted_at: Instant,
    started_at: Instant,
}

impl TaskInfo {
    /// The request the task serves.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// The scheduler running the task.
    pub fn scheduler(&self) -> &str {
        &self.scheduler
    }

    /// Time spent waiting for a worker.
    pub fn queued_for(&self) -> Duration {
        self.started_at.saturating_duration_since(self.submitted_at)
    }

    /// Time since the task started running.
    pub fn running_for(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// One request's worth of work for a scheduler.
///
/// Hooks registered with [`before_execute`](Self::before_execute) run on the
/// worker right before the future is first polled; hooks registered with
/// [`after_execute`](Self::after_execute) run once it completes, panics, or
/// is dropped.
pub struct RequestTask<T> {
    request_id: u64,
    future: BoxFuture<'static, T>,
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
}

impl<T: Send + 'static> RequestTask<T> {
    /// Wraps a future.
    pub fn new<F>(request_id: u64, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            request_id,
            future: future.boxed(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Adds a hook that runs before execution.
    pub fn before_execute<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&TaskInfo) + Send + 'static,
    {
        self.before.push(Box::new(hook));
        self
    }

    /// Adds a hook that runs after execution.
    pub fn after_execute<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&TaskInfo, TaskOutcome) + Send + 'static,
    {
        self.after.push(Box::new(hook));
        self
    }

    /// The request the task serves.
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Runs the task on the current worker. A panic is caught and returned
    /// as its message.
    pub(crate) async fn run(self, scheduler: Arc<str>, submitted_at: Instant) -> Result<T, String> {
        let info = TaskInfo {
            request_id: self.request_id,
            scheduler,
            submitted_at,
            started_at: Instant::now(),
        };
        for hook in self.before {
            hook(&info);
        }

        let mut guard = AfterGuard {
            info,
            hooks: self.after,
            outcome: TaskOutcome::Cancelled,
        };
        match AssertUnwindSafe(self.future).catch_unwind().await {
            Ok(output) => {
                guard.outcome = TaskOutcome::Completed;
                Ok(output)
            }
            Err(payload) => {
                guard.outcome = TaskOutcome::Panicked;
                Err(panic_message(payload.as_ref()))
            }
        }
    }
}

impl<T> fmt::Debug for RequestTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTask")
            .field("request_id", &self.request_id)
            .field("before_hooks", &self.before.len())
            .field("after_hooks", &self.after.len())
            .finish_non_exhaustive()
    }
}

struct AfterGuard {
    info: TaskInfo,
    hooks: Vec<AfterHook>,
    outcome: TaskOutcome,
}

impl Drop for AfterGuard {
    fn drop(&mut self) {
        for hook in std::mem::take(&mut self.hooks) {
            hook(&self.info, self.outcome);
        }
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
