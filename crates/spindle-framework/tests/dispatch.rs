use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http::{Method, StatusCode};
use thiserror::Error;
use tokio::sync::Notify;
use tower::ServiceExt;

use spindle_core::error::{DispatchError, HttpError};
use spindle_core::foundation::{ParamSpec, Request, RequestContext, Response};
use spindle_core::scheduler::{QueueKind, Scheduler, SchedulerConfig};
use spindle_framework::prelude::*;
use spindle_framework::{CacheConfig, PromoteEvery};

#[derive(Debug, Error)]
#[error("quota of {0} exceeded")]
struct QuotaExceeded(u32);

async fn show_user(id: u64, verbose: Option<bool>) -> Result<String, HttpError> {
    if id == 0 {
        return Err(HttpError::not_found("no such user"));
    }
    Ok(format!("user {id} verbose={}", verbose.unwrap_or(false)))
}

async fn explode() -> Result<(), HttpError> {
    panic!("handler exploded")
}

async fn shout(body: String) -> Result<String, HttpError> {
    Ok(body.to_uppercase())
}

fn scheduler(name: &str) -> Scheduler {
    Scheduler::new(SchedulerConfig::new(name).workers(2)).unwrap()
}

fn routes(deployment: Deployment) -> Deployment {
    deployment
        .route(
            RouteDefinition::get("/users/{id}")
                .produces("text/plain")
                .param(ParamSpec::path("id"))
                .param(ParamSpec::query("verbose"))
                .handler(show_user),
        )
        .route(
            RouteDefinition::post("/shout")
                .consumes("text/plain")
                .produces("text/plain")
                .param(ParamSpec::body())
                .handler(shout),
        )
        .route(
            RouteDefinition::get("/admin")
                .header("X-Admin=yes")
                .handler(|| async { Ok::<_, HttpError>("welcome") }),
        )
        .route(
            RouteDefinition::get("/quota")
                .handler(|| async { Err::<String, _>(QuotaExceeded(10)) }),
        )
        .route(RouteDefinition::get("/panic").handler(explode))
}

fn dispatcher() -> Dispatcher {
    routes(Deployment::new().scheduler(scheduler("default")))
        .build()
        .unwrap()
}

fn get(target: &str) -> Request {
    Request::new(Method::GET, target)
}

fn body_text(response: &Response) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}

#[tokio::test]
async fn test_happy_path_resolves_arguments_and_writes_text() {
    let dispatcher = dispatcher();
    let response = dispatcher.dispatch(get("/users/42?verbose=true")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "user 42 verbose=true");
    assert_eq!(
        response.content_type().map(|ct| ct.essence()),
        Some("text/plain".to_string())
    );
    dispatcher.shutdown();
}

#[tokio::test]
async fn test_route_mismatches_map_to_statuses() {
    let dispatcher = dispatcher();

    let response = dispatcher.dispatch(get("/nowhere")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = dispatcher
        .dispatch(Request::new(Method::DELETE, "/users/1"))
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = dispatcher.dispatch(get("/admin")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/shout")
        .header("Content-Type", "application/json")
        .body("{}")
        .build()
        .unwrap();
    let response = dispatcher.dispatch(request).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/users/1")
        .header("Accept", "application/json")
        .build()
        .unwrap();
    let response = dispatcher.dispatch(request).await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);

    dispatcher.shutdown();
}

#[tokio::test]
async fn test_header_predicate_and_body() {
    let dispatcher = dispatcher();

    let request = Request::builder()
        .method(Method::GET)
        .uri("/admin")
        .header("X-Admin", "yes")
        .build()
        .unwrap();
    let response = dispatcher.dispatch(request).await;
    assert_eq!(body_text(&response), "welcome");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/shout")
        .header("Content-Type", "text/plain; charset=utf-8")
        .body("hello")
        .build()
        .unwrap();
    let response = dispatcher.dispatch(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "HELLO");

    dispatcher.shutdown();
}

#[tokio::test]
async fn test_resolution_and_handler_errors() {
    let dispatcher = dispatcher();

    let response = dispatcher.dispatch(get("/users/abc")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(&response).contains("id"));

    let response = dispatcher.dispatch(get("/users/0")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(&response), "no such user");

    let response = dispatcher.dispatch(get("/quota")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(&response), "Internal Server Error");

    dispatcher.shutdown();
}

#[tokio::test]
async fn test_panicking_handler_yields_500() {
    let dispatcher = dispatcher();

    let response = dispatcher.dispatch(get("/panic")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The worker survives the panic.
    let response = dispatcher.dispatch(get("/users/7")).await;
    assert_eq!(response.status(), StatusCode::OK);

    dispatcher.shutdown();
}

#[tokio::test]
async fn test_exception_handlers_run_before_the_terminal() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let dispatcher = routes(Deployment::new().scheduler(scheduler("default")))
        .exception_handler(map_exception(|err: &QuotaExceeded, ctx: &RequestContext| {
            Response::text(
                StatusCode::PAYMENT_REQUIRED,
                format!("{err} for {}", ctx.request().path()),
            )
        }))
        .exception_handler(map_exception(move |_: &HttpError, _: &RequestContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            Response::new(StatusCode::GONE)
        }))
        .build()
        .unwrap();

    let response = dispatcher.dispatch(get("/quota")).await;
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body_text(&response), "quota of 10 exceeded for /quota");

    let response = dispatcher.dispatch(get("/users/0")).await;
    assert_eq!(response.status(), StatusCode::GONE);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    // Errors no handler claims reach the terminal handler.
    let response = dispatcher.dispatch(get("/nowhere")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    dispatcher.shutdown();
}

struct PanickingHandler {
    calls: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ExceptionHandler for PanickingHandler {
    async fn handle(
        &self,
        _ctx: &mut RequestContext,
        _error: DispatchError,
        _next: ExceptionNext<'_>,
    ) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("exception handler exploded")
    }
}

#[tokio::test]
async fn test_panicking_exception_handler_does_not_escape() {
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = routes(Deployment::new().scheduler(scheduler("default")))
        .route(
            RouteDefinition::get("/fail")
                .handler(|| async { Err::<(), _>(HttpError::bad_request("nope")) }),
        )
        .exception_handler(PanickingHandler {
            calls: Arc::clone(&calls),
        })
        .build()
        .unwrap();

    // On a worker.
    let response = dispatcher.dispatch(get("/fail")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(&response), "Internal Server Error");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // On the calling task, through the tower service.
    let response = dispatcher.clone().oneshot(get("/nowhere")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // The worker survives.
    let response = dispatcher.dispatch(get("/users/5")).await;
    assert_eq!(response.status(), StatusCode::OK);
    dispatcher.shutdown();
}

#[tokio::test]
async fn test_routes_run_on_their_own_scheduler() {
    let dispatcher = Deployment::new()
        .scheduler(scheduler("default"))
        .scheduler(scheduler("reports"))
        .default_scheduler("default")
        .route(
            RouteDefinition::get("/where")
                .handler(|| async { Ok::<_, HttpError>(current_thread_name()) }),
        )
        .route(
            RouteDefinition::get("/report")
                .scheduler("reports")
                .handler(|| async { Ok::<_, HttpError>(current_thread_name()) }),
        )
        .build()
        .unwrap();

    let response = dispatcher.dispatch(get("/where")).await;
    assert_eq!(body_text(&response), "default-worker");

    let response = dispatcher.dispatch(get("/report")).await;
    assert_eq!(body_text(&response), "reports-worker");

    dispatcher.shutdown();
}

fn current_thread_name() -> String {
    std::thread::current().name().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_saturated_scheduler_rejects_with_its_name() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (on_start, on_release) = (Arc::clone(&started), Arc::clone(&release));

    let tight = Scheduler::new(
        SchedulerConfig::new("tight")
            .workers(1)
            .queue(QueueKind::Direct),
    )
    .unwrap();
    let dispatcher = Deployment::new()
        .scheduler(tight)
        .route(RouteDefinition::get("/slow").handler(move || {
            let (on_start, on_release) = (Arc::clone(&on_start), Arc::clone(&on_release));
            async move {
                on_start.notify_one();
                on_release.notified().await;
                Ok::<_, HttpError>("done")
            }
        }))
        .build()
        .unwrap();

    // One poll routes the request and hands it to the only worker.
    let mut first = tokio_test::task::spawn(dispatcher.dispatch(get("/slow")));
    tokio_test::assert_pending!(first.poll());
    started.notified().await;

    let rejected = dispatcher.dispatch(get("/slow")).await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(body_text(&rejected).contains("rejected by scheduler 'tight'"));

    release.notify_one();
    let first = first.await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(body_text(&first), "done");

    dispatcher.shutdown();
}

#[tokio::test]
async fn test_timeout_and_shutdown_are_unavailable() {
    let dispatcher = Deployment::new()
        .scheduler(
            Scheduler::new(
                SchedulerConfig::new("bounded")
                    .workers(1)
                    .timeout(Duration::from_millis(50)),
            )
            .unwrap(),
        )
        .route(RouteDefinition::get("/sleep").handler(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, HttpError>("late")
        }))
        .build()
        .unwrap();

    let response = dispatcher.dispatch(get("/sleep")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_text(&response).contains("timed out after 50ms"));

    dispatcher.shutdown();
    let response = dispatcher.dispatch(get("/sleep")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_text(&response).contains("shutdown"));
}

#[tokio::test]
async fn test_cached_routing_matches_linear_routing() {
    let linear = dispatcher();
    let cached = routes(Deployment::new().scheduler(scheduler("default")))
        .routing(RoutingStrategy::cached_with(
            CacheConfig {
                min_routes: 0,
                capacity: 8,
            },
            PromoteEvery::new(2),
        ))
        .build()
        .unwrap();

    let targets = [
        (Method::GET, "/users/5?verbose=false"),
        (Method::GET, "/users/5"),
        (Method::GET, "/users/x"),
        (Method::DELETE, "/users/5"),
        (Method::GET, "/missing"),
        (Method::GET, "/admin"),
    ];
    for _ in 0..3 {
        for (method, target) in &targets {
            let expected = linear.dispatch(Request::new(method.clone(), target)).await;
            let actual = cached.dispatch(Request::new(method.clone(), target)).await;
            assert_eq!(actual.status(), expected.status(), "{method} {target}");
            assert_eq!(actual.body(), expected.body(), "{method} {target}");
        }
    }

    linear.shutdown();
    cached.shutdown();
}

#[tokio::test]
async fn test_dispatcher_is_a_tower_service() {
    let dispatcher = dispatcher();
    let response = dispatcher
        .clone()
        .oneshot(get("/users/3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(&response), "user 3 verbose=false");
    dispatcher.shutdown();
}
