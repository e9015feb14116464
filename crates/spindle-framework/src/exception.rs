//! Exception chain.
//!
//! Failures at any dispatch stage are turned into a response by an ordered
//! list of [`ExceptionHandler`]s ending in one mandatory
//! [`TerminalExceptionHandler`]. Each handler either answers or passes the
//! error on with [`ExceptionNext::proceed`]; the terminal handler always
//! answers, so every error produces exactly one response.
//!
//! A response that has already been committed is never rewritten: the chain
//! hands it back untouched.
//!
//! # Example
//!
//! ```rust,ignore
//! let chain = ExceptionChain::builder()
//!     .handler(ExceptionMapper::new(|err: &QuotaExceeded, _ctx: &RequestContext| {
//!         Response::text(StatusCode::PAYMENT_REQUIRED, err.to_string())
//!     }))
//!     .build();
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use tracing::{debug, error, warn};

use spindle_core::error::{DispatchError, HttpError};
use spindle_core::foundation::{DEFAULT_ORDER, OrderedList, RequestContext, Response};
use spindle_core::scheduler::panic_message;

// ============================================================================
// Handler traits
// ============================================================================

/// One link of the exception chain.
#[async_trait]
pub trait ExceptionHandler: Send + Sync {
    /// Produces a response for `error`, or delegates with `next.proceed`.
    async fn handle(
        &self,
        ctx: &mut RequestContext,
        error: DispatchError,
        next: ExceptionNext<'_>,
    ) -> Response;

    /// Lower runs earlier.
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }
}

/// The last link of the exception chain. Must always answer.
#[async_trait]
pub trait TerminalExceptionHandler: Send + Sync {
    /// Produces the response for `error`.
    async fn handle(&self, ctx: &mut RequestContext, error: DispatchError) -> Response;
}

/// Cursor into an exception chain, valid for one error.
pub struct ExceptionNext<'a> {
    handlers: &'a [Arc<dyn ExceptionHandler>],
    terminal: &'a dyn TerminalExceptionHandler,
}

impl<'a> ExceptionNext<'a> {
    fn new(
        handlers: &'a [Arc<dyn ExceptionHandler>],
        terminal: &'a dyn TerminalExceptionHandler,
    ) -> Self {
        Self { handlers, terminal }
    }

    /// Passes the error to the next handler, or the terminal one.
    pub async fn proceed(self, ctx: &mut RequestContext, error: DispatchError) -> Response {
        match self.handlers.split_first() {
            Some((handler, rest)) => {
                handler
                    .handle(ctx, error, ExceptionNext::new(rest, self.terminal))
                    .await
            }
            None => self.terminal.handle(ctx, error).await,
        }
    }
}

impl fmt::Debug for ExceptionNext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionNext")
            .field("remaining", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Chain
// ============================================================================

/// Ordered exception handlers plus the terminal handler.
#[derive(Clone)]
pub struct ExceptionChain {
    handlers: Arc<[Arc<dyn ExceptionHandler>]>,
    terminal: Arc<dyn TerminalExceptionHandler>,
}

impl Default for ExceptionChain {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ExceptionChain {
    /// Returns a builder with [`DefaultExceptionHandler`] as terminal.
    pub fn builder() -> ExceptionChainBuilder {
        ExceptionChainBuilder::default()
    }

    /// Number of non-terminal handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if only the terminal handler is present.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the chain for `error` and returns the response to send.
    ///
    /// The chain runs at most once per failure. If a handler panics, the
    /// committed response is kept, otherwise a bare 500 is returned.
    pub async fn handle(&self, ctx: &mut RequestContext, error: DispatchError) -> Response {
        if ctx.response().is_committed() {
            debug!(request_id = ctx.id(), %error, "Response already committed, skipping exception chain");
            return ctx.take_response();
        }
        let chain = ExceptionNext::new(&self.handlers, &*self.terminal).proceed(ctx, error);
        match AssertUnwindSafe(chain).catch_unwind().await {
            Ok(response) => response,
            Err(payload) => {
                let panic = panic_message(payload.as_ref());
                error!(request_id = ctx.id(), %panic, "Exception handler panicked");
                if ctx.response().is_committed() {
                    return ctx.take_response();
                }
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                Response::text(status, status.canonical_reason().unwrap_or("Error"))
            }
        }
    }
}

impl fmt::Debug for ExceptionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionChain")
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ExceptionChain`].
pub struct ExceptionChainBuilder {
    handlers: OrderedList<Arc<dyn ExceptionHandler>>,
    terminal: Arc<dyn TerminalExceptionHandler>,
}

impl Default for ExceptionChainBuilder {
    fn default() -> Self {
        Self {
            handlers: OrderedList::new(),
            terminal: Arc::new(DefaultExceptionHandler),
        }
    }
}

impl ExceptionChainBuilder {
    /// Adds a handler at its own order.
    pub fn handler(self, handler: impl ExceptionHandler + 'static) -> Self {
        self.handler_arc(Arc::new(handler))
    }

    /// Adds a shared handler at its own order.
    pub fn handler_arc(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.handlers.push(handler.order(), handler);
        self
    }

    /// Replaces the terminal handler.
    pub fn terminal(mut self, terminal: impl TerminalExceptionHandler + 'static) -> Self {
        self.terminal = Arc::new(terminal);
        self
    }

    /// Finishes the chain.
    pub fn build(self) -> ExceptionChain {
        ExceptionChain {
            handlers: self.handlers.into_vec().into(),
            terminal: self.terminal,
        }
    }
}

// ============================================================================
// Built-in handlers
// ============================================================================

/// Maps every error to its default status.
///
/// 4xx responses and scheduler rejections carry the diagnostic message;
/// other 5xx responses carry only the status reason and are logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExceptionHandler;

#[async_trait]
impl TerminalExceptionHandler for DefaultExceptionHandler {
    async fn handle(&self, ctx: &mut RequestContext, error: DispatchError) -> Response {
        if ctx.response().is_committed() {
            return ctx.take_response();
        }
        let status = error.status();
        let body = if let Some(rejection) = error.rejection() {
            warn!(request_id = ctx.id(), %rejection, "Request rejected");
            rejection.to_string()
        } else if status.is_server_error() {
            error!(request_id = ctx.id(), stage = %ctx.stage(), %error, "Request failed");
            status.canonical_reason().unwrap_or("Error").to_string()
        } else {
            debug!(request_id = ctx.id(), %status, %error, "Request failed");
            diagnostic(&error)
        };
        Response::text(status, body)
    }
}

/// The client-facing message for a 4xx error.
fn diagnostic(error: &DispatchError) -> String {
    if let Some(err) = error.downcast_ref::<HttpError>() {
        return err.message().to_string();
    }
    match error {
        DispatchError::RouteMismatch { reason } => reason.to_string(),
        DispatchError::Resolution(err) | DispatchError::Handler(err) => err.to_string(),
        other => other.to_string(),
    }
}

type MapFn<E> = Box<dyn Fn(&E, &RequestContext) -> Response + Send + Sync>;

/// Handles one concrete error type and delegates everything else.
///
/// The error is looked up in the boxed source of resolution and handler
/// failures, and in scheduler rejections.
pub struct ExceptionMapper<E> {
    map: MapFn<E>,
    order: i32,
    _marker: PhantomData<fn(&E)>,
}

impl<E: std::error::Error + 'static> ExceptionMapper<E> {
    /// Creates a mapper at [`DEFAULT_ORDER`].
    pub fn new(map: impl Fn(&E, &RequestContext) -> Response + Send + Sync + 'static) -> Self {
        Self {
            map: Box::new(map),
            order: DEFAULT_ORDER,
            _marker: PhantomData,
        }
    }

    /// Sets the order.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

#[async_trait]
impl<E: std::error::Error + 'static> ExceptionHandler for ExceptionMapper<E> {
    async fn handle(
        &self,
        ctx: &mut RequestContext,
        error: DispatchError,
        next: ExceptionNext<'_>,
    ) -> Response {
        if let Some(err) = error.downcast_ref::<E>() {
            return (self.map)(err, ctx);
        }
        next.proceed(ctx, error).await
    }

    fn order(&self) -> i32 {
        self.order
    }
}

impl<E> fmt::Debug for ExceptionMapper<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionMapper")
            .field("error", &std::any::type_name::<E>())
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Shorthand for [`ExceptionMapper::new`].
pub fn map_exception<E, F>(map: F) -> ExceptionMapper<E>
where
    E: std::error::Error + 'static,
    F: Fn(&E, &RequestContext) -> Response + Send + Sync + 'static,
{
    ExceptionMapper::new(map)
}

/// Responds with a fixed status for every error that reaches it.
#[derive(Debug, Clone, Copy)]
pub struct StatusExceptionHandler(pub StatusCode);

#[async_trait]
impl TerminalExceptionHandler for StatusExceptionHandler {
    async fn handle(&self, _ctx: &mut RequestContext, _error: DispatchError) -> Response {
        Response::new(self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::Method;
    use spindle_core::error::{MismatchReason, Rejection, RejectionReason, ResolveError};
    use spindle_core::foundation::Request;
    use thiserror::Error;

    use super::*;

    #[derive(Debug, Error)]
    #[error("quota exceeded")]
    struct QuotaExceeded;

    fn context() -> RequestContext {
        RequestContext::new(3, Arc::new(Request::new(Method::GET, "/q")))
    }

    fn body(response: &Response) -> &str {
        std::str::from_utf8(response.body()).unwrap()
    }

    struct Specific {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ExceptionHandler for Specific {
        async fn handle(
            &self,
            ctx: &mut RequestContext,
            error: DispatchError,
            next: ExceptionNext<'_>,
        ) -> Response {
            self.calls.fetch_add(1, Ordering::SeqCst);
            next.proceed(ctx, error).await
        }
    }

    #[tokio::test]
    async fn test_declining_handler_falls_through_to_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ExceptionChain::builder()
            .handler(Specific {
                calls: Arc::clone(&calls),
            })
            .build();

        let response = chain
            .handle(&mut context(), DispatchError::mismatch(MismatchReason::Pattern))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response), "pattern mismatch");
    }

    #[tokio::test]
    async fn test_mapper_handles_its_error_type_only() {
        let chain = ExceptionChain::builder()
            .handler(map_exception(|_: &QuotaExceeded, _: &RequestContext| {
                Response::text(StatusCode::PAYMENT_REQUIRED, "pay up")
            }))
            .build();

        let response = chain
            .handle(&mut context(), DispatchError::Handler(Box::new(QuotaExceeded)))
            .await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let response = chain
            .handle(
                &mut context(),
                DispatchError::Resolution(Box::new(ResolveError::missing("id"))),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&response), "missing required parameter 'id'");
    }

    #[tokio::test]
    async fn test_handlers_run_in_order() {
        let chain = ExceptionChain::builder()
            .handler(
                map_exception(|_: &QuotaExceeded, _: &RequestContext| Response::new(StatusCode::GONE))
                    .with_order(5),
            )
            .handler(
                map_exception(|_: &QuotaExceeded, _: &RequestContext| {
                    Response::new(StatusCode::IM_A_TEAPOT)
                })
                .with_order(-5),
            )
            .build();
        let response = chain
            .handle(&mut context(), DispatchError::Handler(Box::new(QuotaExceeded)))
            .await;
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(chain.len(), 2);
    }

    #[tokio::test]
    async fn test_server_errors_hide_details_but_rejections_do_not() {
        let chain = ExceptionChain::default();

        let response = chain
            .handle(&mut context(), DispatchError::Handler("db password wrong".into()))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&response), "Internal Server Error");

        let rejection = Rejection::new("io", RejectionReason::Shutdown);
        let response = chain.handle(&mut context(), rejection.into()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body(&response).contains("'io'"));

        let response = chain
            .handle(
                &mut context(),
                DispatchError::Handler(Box::new(HttpError::bad_request("bad id"))),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&response), "bad id");
    }

    #[tokio::test]
    async fn test_committed_response_is_not_rewritten() {
        let chain = ExceptionChain::default();
        let mut ctx = context();
        ctx.response_mut().set_status(StatusCode::CREATED);
        ctx.response_mut().commit();

        let response = chain
            .handle(&mut ctx, DispatchError::Panic("boom".into()))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.is_committed());
    }

    #[tokio::test]
    async fn test_custom_terminal() {
        let chain = ExceptionChain::builder()
            .terminal(StatusExceptionHandler(StatusCode::BAD_GATEWAY))
            .build();
        let response = chain
            .handle(&mut context(), DispatchError::Panic("boom".into()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    struct Faulty {
        calls: Arc<AtomicUsize>,
        commit_first: bool,
    }

    #[async_trait]
    impl ExceptionHandler for Faulty {
        async fn handle(
            &self,
            ctx: &mut RequestContext,
            _error: DispatchError,
            _next: ExceptionNext<'_>,
        ) -> Response {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.commit_first {
                ctx.response_mut().set_status(StatusCode::ACCEPTED);
                ctx.response_mut().commit();
            }
            panic!("exception handler exploded")
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_yields_bare_500_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ExceptionChain::builder()
            .handler(Faulty {
                calls: Arc::clone(&calls),
                commit_first: false,
            })
            .build();

        let response = chain
            .handle(&mut context(), DispatchError::Handler(Box::new(QuotaExceeded)))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&response), "Internal Server Error");
    }

    #[tokio::test]
    async fn test_panicking_handler_keeps_committed_response() {
        let chain = ExceptionChain::builder()
            .handler(Faulty {
                calls: Arc::new(AtomicUsize::new(0)),
                commit_first: true,
            })
            .build();

        let response = chain
            .handle(&mut context(), DispatchError::Panic("boom".into()))
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
