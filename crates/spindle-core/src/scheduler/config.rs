//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many tasks may wait for a worker.
///
/// In configuration files this is written as `queue = "direct"`,
/// `queue = "unbounded"` or `queue = { bounded = 128 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// At most this many tasks wait; further submissions are rejected.
    Bounded(usize),
    /// No waiting room: a task is accepted only if a worker is free.
    Direct,
    /// Tasks always queue.
    #[default]
    Unbounded,
}

impl QueueKind {
    /// The waiting room size, or `None` if unbounded.
    pub fn capacity(self) -> Option<usize> {
        match self {
            Self::Bounded(capacity) => Some(capacity),
            Self::Direct => Some(0),
            Self::Unbounded => None,
        }
    }
}

/// Settings of one named scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Unique scheduler name routes refer to.
    pub name: String,

    /// Number of worker threads, which is also the number of tasks that run
    /// at once.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Queue behind the workers.
    #[serde(default)]
    pub queue: QueueKind,

    /// Deadline for a task, measured from submission.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(4)
}

impl SchedulerConfig {
    /// Creates a configuration with default workers and an unbounded queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            workers: default_workers(),
            queue: QueueKind::Unbounded,
            timeout_ms: None,
        }
    }

    /// Sets the worker count.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the queue kind.
    pub fn queue(mut self, queue: QueueKind) -> Self {
        self.queue = queue;
        self
    }

    /// Sets the task deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// The task deadline.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
