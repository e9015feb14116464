//! Scheduler pool: named worker pools that run request tasks off the
//! transport path.
//!
//! Every route is bound to one [`Scheduler`] by name when the deployment is
//! built. Saturation, shutdown and timeouts never surface as panics or
//! silently dropped work: they are reported as a [`Rejection`] through the
//! same failure path as every other error.

mod config;
mod metrics;
mod pool;
mod task;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

pub use config::{QueueKind, SchedulerConfig};
pub use metrics::SchedulerMetrics;
pub use pool::{RejectionListener, Scheduler, SchedulerBuilder, TaskHandle};
pub use task::{RequestTask, TaskInfo, TaskOutcome, panic_message};

use crate::error::{DispatchError, Rejection};

/// Why a submitted task produced no output.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The scheduler refused, abandoned or timed out the task.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl From<TaskError> for DispatchError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Rejected(rejection) => Self::Rejected(rejection),
            TaskError::Panicked(message) => Self::Panic(message),
        }
    }
}

/// Schedulers by name.
#[derive(Debug, Clone, Default)]
pub struct Schedulers {
    by_name: BTreeMap<String, Scheduler>,
}

impl Schedulers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scheduler. A scheduler with the same name is handed back
    /// as the error.
    pub fn insert(&mut self, scheduler: Scheduler) -> Result<(), Scheduler> {
        if self.by_name.contains_key(scheduler.name()) {
            return Err(scheduler);
        }
        debug!(scheduler = scheduler.name(), "Registered scheduler");
        self.by_name.insert(scheduler.name().to_string(), scheduler);
        Ok(())
    }

    /// Looks up a scheduler.
    pub fn get(&self, name: &str) -> Option<&Scheduler> {
        self.by_name.get(name)
    }

    /// Returns true if a scheduler with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Scheduler names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// All schedulers in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Scheduler> {
        self.by_name.values()
    }

    /// Number of schedulers.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Shuts every scheduler down.
    pub fn shutdown_all(&self) {
        for scheduler in self.by_name.values() {
            scheduler.shutdown();
        }
    }
}
