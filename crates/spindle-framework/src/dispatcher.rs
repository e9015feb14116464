//! Request dispatcher.
//!
//! The [`Dispatcher`] receives requests from a transport and drives each one
//! through a fixed sequence of stages:
//!
//! 1. **Routing** on the calling task: the route table picks the endpoint or
//!    reports the most specific mismatch.
//! 2. **Scheduling**: the rest of the work is submitted to the route's
//!    scheduler. A rejection is handled on the calling task.
//! 3. **Resolving params**, **invoking** and **resolving the response** on a
//!    scheduler worker. Failures and panics in these stages go through the
//!    exception chain on the same worker, with the original context.
//!
//! Every request yields exactly one [`Response`].
//!
//! ```rust,ignore
//! let dispatcher = Deployment::new()
//!     .scheduler(Scheduler::new(SchedulerConfig::new("default"))?)
//!     .route(RouteDefinition::get("/hello/{name}").param(ParamSpec::path("name")).handler(hello))
//!     .build()?;
//!
//! let response = dispatcher.dispatch(Request::new(Method::GET, "/hello/ada")).await;
//! ```

use std::convert::Infallible;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::Service;
use tracing::{Instrument, debug, info_span, trace};

use spindle_core::error::{DispatchError, DispatchResult, Rejection, RejectionReason};
use spindle_core::foundation::{DispatchStage, MediaType, Request, RequestContext, Response};
use spindle_core::scheduler::{RequestTask, Schedulers, panic_message};

use crate::binding::Endpoint;
use crate::exception::ExceptionChain;
use crate::route::RouteRegistry;

/// The route table a dispatcher routes with.
pub type EndpointRoutes = Arc<dyn RouteRegistry<Endpoint>>;

struct DispatcherInner {
    routes: EndpointRoutes,
    schedulers: Schedulers,
    exceptions: ExceptionChain,
    next_id: AtomicU64,
}

/// Routes requests to endpoints and runs them on their schedulers.
///
/// Cloning is cheap; clones share the route table, schedulers and request
/// id sequence.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Creates a dispatcher from already bound parts.
    ///
    /// Usually built through [`Deployment`](crate::deploy::Deployment),
    /// which also checks that every route's scheduler exists.
    pub fn new(routes: EndpointRoutes, schedulers: Schedulers, exceptions: ExceptionChain) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                routes,
                schedulers,
                exceptions,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// The route table.
    pub fn routes(&self) -> &dyn RouteRegistry<Endpoint> {
        &*self.inner.routes
    }

    /// The schedulers.
    pub fn schedulers(&self) -> &Schedulers {
        &self.inner.schedulers
    }

    /// The exception chain.
    pub fn exceptions(&self) -> &ExceptionChain {
        &self.inner.exceptions
    }

    /// Shuts every scheduler down. Requests dispatched afterwards are
    /// rejected.
    pub fn shutdown(&self) {
        self.inner.schedulers.shutdown_all();
    }

    /// Dispatches one request and returns its response.
    pub async fn dispatch(&self, request: Request) -> Response {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let span = info_span!(
            "dispatch",
            request_id = id,
            method = %request.method(),
            path = %request.path(),
        );
        let started = Instant::now();
        let response = self.run(id, Arc::new(request)).instrument(span.clone()).await;
        span.in_scope(|| {
            debug!(
                status = %response.status(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Request dispatched"
            );
        });
        response
    }

    async fn run(&self, id: u64, request: Arc<Request>) -> Response {
        let mut ctx = RequestContext::new(id, Arc::clone(&request));

        let (endpoint, scheduler_name, acceptable) = match self.inner.routes.route(&request) {
            Ok(matched) => {
                let (route, path, acceptable) = matched.into_parts();
                trace!(route = route.name(), scheduler = route.scheduler(), "Route selected");
                ctx.set_path_match(path);
                (
                    route.target().clone(),
                    route.scheduler().to_string(),
                    acceptable,
                )
            }
            Err(reason) => {
                debug!(%reason, "No route accepted the request");
                return self.fail(&mut ctx, DispatchError::mismatch(reason)).await;
            }
        };

        ctx.set_stage(DispatchStage::Scheduling);
        let Some(scheduler) = self.inner.schedulers.get(&scheduler_name) else {
            let rejection = Rejection::new(
                scheduler_name,
                RejectionReason::Other("scheduler is not registered".to_string()),
            );
            return self.fail(&mut ctx, rejection.into()).await;
        };

        let exceptions = self.inner.exceptions.clone();
        let work = async move {
            let outcome = AssertUnwindSafe(execute(&endpoint, &mut ctx, acceptable))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(DispatchError::Panic(panic_message(payload.as_ref()))));
            match outcome {
                Ok(()) => {
                    ctx.set_stage(DispatchStage::Done);
                    ctx.take_response()
                }
                Err(error) => {
                    ctx.set_stage(DispatchStage::ExceptionHandling);
                    exceptions.handle(&mut ctx, error).await
                }
            }
        }
        .in_current_span();

        match scheduler.submit(RequestTask::new(id, work)).await {
            Ok(response) => response,
            Err(error) => {
                // The context moved into the task; failures of the task
                // itself are handled with a fresh one.
                let mut ctx = RequestContext::new(id, request);
                ctx.set_stage(DispatchStage::Scheduling);
                self.fail(&mut ctx, error.into()).await
            }
        }
    }

    async fn fail(&self, ctx: &mut RequestContext, error: DispatchError) -> Response {
        ctx.set_stage(DispatchStage::ExceptionHandling);
        self.inner.exceptions.handle(ctx, error).await
    }
}

/// Runs the worker-side stages for one request.
async fn execute(
    endpoint: &Endpoint,
    ctx: &mut RequestContext,
    acceptable: Vec<MediaType>,
) -> DispatchResult<()> {
    ctx.set_stage(DispatchStage::ResolvingParams);
    let args = endpoint
        .resolve_args(ctx)
        .map_err(DispatchError::Resolution)?;

    ctx.set_stage(DispatchStage::Invoking);
    let call = endpoint
        .invoke(args)
        .map_err(|err| DispatchError::Resolution(err.into()))?;
    let value = call.await.map_err(DispatchError::Handler)?;

    ctx.set_stage(DispatchStage::ResolvingResponse);
    endpoint
        .write_response(ctx, value, acceptable)
        .map_err(DispatchError::Resolution)
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.inner.routes.len())
            .field("schedulers", &self.inner.schedulers.len())
            .field("exception_handlers", &self.inner.exceptions.len())
            .finish()
    }
}

// ============================================================================
// Tower Service Implementation for Dispatcher
// ============================================================================

/// Lets transports and tower middleware drive the dispatcher. Failures are
/// already turned into responses, so the service never errors.
impl Service<Request> for Dispatcher {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let dispatcher = self.clone();
        async move { Ok(dispatcher.dispatch(request).await) }.boxed()
    }
}
