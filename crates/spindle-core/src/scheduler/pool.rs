//! Named worker pools.
//!
//! A [`Scheduler`] owns a dedicated multi-threaded tokio runtime whose
//! threads are named `<name>-worker`. Two semaphores shape admission:
//!
//! - the *admission* semaphore holds `workers + queue capacity` permits and
//!   is acquired without waiting at submission time, so a saturated pool
//!   rejects immediately instead of blocking the caller;
//! - the *worker* semaphore holds `workers` permits and is awaited by
//!   admitted tasks, so at most `workers` tasks run at once and waiting tasks
//!   start in submission order.
//!
//! Unbounded queues skip the admission semaphore.
//!
//! # Example
//!
//! ```rust,ignore
//! use spindle_core::scheduler::{QueueKind, RequestTask, Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(
//!     SchedulerConfig::new("biz").workers(8).queue(QueueKind::Bounded(256)),
//! )?;
//!
//! let answer = scheduler.submit(RequestTask::new(1, async { 42 })).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::TaskError;
use super::config::SchedulerConfig;
use super::metrics::SchedulerMetrics;
use super::task::{RequestTask, panic_message};
use crate::error::{Rejection, RejectionReason};

/// Callback observing every rejection of a scheduler.
pub type RejectionListener = Arc<dyn Fn(&Rejection) + Send + Sync>;

/// Produces rejections and keeps the counters and listener in sync.
struct Reporter {
    name: Arc<str>,
    metrics: Arc<SchedulerMetrics>,
    listener: Option<RejectionListener>,
}

impl Reporter {
    fn reject(&self, reason: RejectionReason) -> Rejection {
        let rejection = Rejection::new(self.name.as_ref(), reason);
        self.metrics.record_rejection();
        warn!(
            scheduler = %self.name,
            queue_depth = self.metrics.queue_depth(),
            active = self.metrics.active(),
            "{rejection}"
        );
        if let Some(listener) = &self.listener {
            listener(&rejection);
        }
        rejection
    }
}

/// Decrements the queue depth when a task leaves the queue for any reason.
struct Queued {
    metrics: Arc<SchedulerMetrics>,
}

impl Queued {
    fn start(self) -> Running {
        let metrics = Arc::clone(&self.metrics);
        drop(self);
        metrics.record_start();
        Running { metrics }
    }
}

impl Drop for Queued {
    fn drop(&mut self) {
        self.metrics.record_dequeue();
    }
}

struct Running {
    metrics: Arc<SchedulerMetrics>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.metrics.record_finish();
    }
}

struct SchedulerInner {
    config: SchedulerConfig,
    reporter: Arc<Reporter>,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    admission: Option<Arc<Semaphore>>,
    workers: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

/// A named worker pool with a queue, optional timeout and mandatory
/// rejection handling.
///
/// Cloning is cheap and yields a handle to the same pool.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Starts a scheduler.
    pub fn new(config: SchedulerConfig) -> io::Result<Self> {
        Self::builder(config).build()
    }

    /// Returns a builder.
    pub fn builder(config: SchedulerConfig) -> SchedulerBuilder {
        SchedulerBuilder {
            config,
            listener: None,
        }
    }

    /// The scheduler name.
    pub fn name(&self) -> &str {
        &self.inner.reporter.name
    }

    /// The configuration it was started with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// The task deadline, if any.
    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.inner.config.timeout_duration()
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Live counters.
    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.inner.reporter.metrics
    }

    /// Hands a task to the pool without blocking.
    ///
    /// The returned handle resolves to the task output, or to a
    /// [`TaskError`] if the task was rejected, timed out, cancelled by
    /// shutdown, or panicked.
    pub fn submit<T: Send + 'static>(&self, task: RequestTask<T>) -> TaskHandle<T> {
        let inner = &self.inner;
        let reporter = &inner.reporter;

        if inner.shutdown.is_cancelled() {
            return TaskHandle::rejected(reporter.reject(RejectionReason::Shutdown));
        }

        let admit = match &inner.admission {
            Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::Closed) => {
                    return TaskHandle::rejected(reporter.reject(RejectionReason::Shutdown));
                }
                Err(TryAcquireError::NoPermits) => {
                    let depth = reporter.metrics.queue_depth();
                    return TaskHandle::rejected(
                        reporter.reject(RejectionReason::QueueFull { depth }),
                    );
                }
            },
            None => None,
        };

        reporter.metrics.record_submit();
        let request_id = task.request_id();
        let submitted_at = Instant::now();
        let queued = Queued {
            metrics: Arc::clone(&reporter.metrics),
        };
        let workers = Arc::clone(&inner.workers);
        let shutdown = inner.shutdown.clone();
        let job_reporter = Arc::clone(reporter);

        let job = async move {
            let _admit = admit;
            let permit = tokio::select! {
                biased;
                () = shutdown.cancelled() => None,
                permit = workers.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                drop(queued);
                return Err(TaskError::Rejected(
                    job_reporter.reject(RejectionReason::Shutdown),
                ));
            };

            let _running = queued.start();
            debug!(scheduler = %job_reporter.name, "Task started");
            let result = task.run(Arc::clone(&job_reporter.name), submitted_at).await;
            job_reporter.metrics.record_completion();
            result.map_err(TaskError::Panicked)
        };

        let deadline = inner.config.timeout_duration();
        let timeout_reporter = Arc::clone(reporter);
        let job = async move {
            match deadline {
                Some(limit) => match tokio::time::timeout(limit, job).await {
                    Ok(result) => result,
                    Err(_) => {
                        timeout_reporter.metrics.record_timeout();
                        Err(TaskError::Rejected(
                            timeout_reporter.reject(RejectionReason::Timeout(limit)),
                        ))
                    }
                },
                None => job.await,
            }
        }
        .instrument(info_span!("task", scheduler = %reporter.name, request_id));

        let join = inner.handle.spawn(job);
        let join_reporter = Arc::clone(reporter);
        TaskHandle {
            future: async move {
                match join.await {
                    Ok(result) => result,
                    Err(err) if err.is_cancelled() => Err(TaskError::Rejected(
                        join_reporter.reject(RejectionReason::Shutdown),
                    )),
                    Err(err) => Err(TaskError::Panicked(panic_message(
                        err.into_panic().as_ref(),
                    ))),
                }
            }
            .boxed(),
        }
    }

    /// Stops accepting work, rejects queued tasks and cancels running ones.
    /// Idempotent.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return;
        }
        inner.shutdown.cancel();
        if let Some(admission) = &inner.admission {
            admission.close();
        }
        inner.workers.close();
        if let Some(runtime) = inner.runtime.lock().take() {
            runtime.shutdown_background();
        }
        info!(scheduler = %inner.reporter.name, "Scheduler shut down");
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name())
            .field("workers", &self.inner.config.workers)
            .field("queue", &self.inner.config.queue)
            .field("timeout", &self.timeout())
            .field("shutdown", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Scheduler`].
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    listener: Option<RejectionListener>,
}

impl SchedulerBuilder {
    /// Observes every rejection, e.g. for alerting.
    pub fn on_rejected<F>(mut self, listener: F) -> Self
    where
        F: Fn(&Rejection) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Starts the worker threads.
    pub fn build(self) -> io::Result<Scheduler> {
        let config = self.config;
        let workers = config.workers.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name(format!("{}-worker", config.name))
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        let admission = config
            .queue
            .capacity()
            .map(|capacity| Arc::new(Semaphore::new(workers + capacity)));

        info!(
            scheduler = %config.name,
            workers,
            queue = ?config.queue,
            timeout_ms = ?config.timeout_ms,
            "Scheduler started"
        );

        Ok(Scheduler {
            inner: Arc::new(SchedulerInner {
                reporter: Arc::new(Reporter {
                    name: Arc::from(config.name.as_str()),
                    metrics: Arc::new(SchedulerMetrics::new()),
                    listener: self.listener,
                }),
                handle,
                runtime: Mutex::new(Some(runtime)),
                admission,
                workers: Arc::new(Semaphore::new(workers)),
                shutdown: CancellationToken::new(),
                config,
            }),
        })
    }
}

/// The pending result of a submitted task.
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<T> {
    future: BoxFuture<'static, Result<T, TaskError>>,
}

impl<T: Send + 'static> TaskHandle<T> {
    fn rejected(rejection: Rejection) -> Self {
        Self {
            future: future::ready(Err(TaskError::Rejected(rejection))).boxed(),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}
