//! # Spindle
//!
//! A request resolution and dispatch engine with pluggable resolver chains
//! and named worker pools.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌────────────┐     ┌─────────────┐
//! │ Transport │────▶│ Dispatcher │────▶│ Route Table │  (caller's task)
//! └───────────┘     └────────────┘     └─────────────┘
//!                         │
//!                         ▼  route's scheduler
//!        ┌─────────────────────────────────────────────────────────┐
//!        │ param resolvers ──▶ handler ──▶ response entity writers │
//!        │        └──────────── exception chain ◀─────────┘        │
//!        └─────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Routes**: method, path pattern, header, consumes and produces
//!   predicates; a mismatch maps to 405/404/400/415/406
//! - **Resolvers**: ordered factories for string conversion, parameters,
//!   context values and request/response entities, each wrappable by advice
//! - **Schedulers**: named worker pools with bounded, direct or unbounded
//!   queues; saturation is a structured rejection
//! - **Exception chain**: ordered handlers ending in a terminal handler
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spindle::prelude::*;
//!
//! async fn greet(name: String, times: Option<u8>) -> Result<String, HttpError> {
//!     Ok(format!("hello {name}! ").repeat(times.unwrap_or(1) as usize))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = SpindleRuntime::builder().build()?;
//!     runtime.init_logging();
//!
//!     let dispatcher = runtime
//!         .route(
//!             RouteDefinition::get("/greet/{name}")
//!                 .produces("text/plain")
//!                 .param(ParamSpec::path("name"))
//!                 .param(ParamSpec::query("times"))
//!                 .handler(greet),
//!         )
//!         .build()?;
//!
//!     let response = dispatcher.dispatch(Request::new(Method::GET, "/greet/ada?times=2")).await;
//!     assert_eq!(response.status(), StatusCode::OK);
//!
//!     run_until_signal(&dispatcher).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log lines

pub use spindle_core as core;
pub use spindle_framework as framework;
pub use spindle_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use spindle::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use spindle_runtime::{SpindleConfig, SpindleRuntime, run_until_signal};

    // Deployment and dispatch
    pub use spindle_framework::{
        Deployment, Dispatcher, RouteDefinition, RoutingStrategy,
        exception::{ExceptionHandler, ExceptionNext, map_exception},
        resolver::ResolverRegistry,
    };

    // Request model
    pub use spindle_core::error::{DispatchError, HttpError};
    pub use spindle_core::foundation::{ParamSpec, Request, RequestContext, Response, Value};
    pub use spindle_core::http::{Method, StatusCode};
    pub use spindle_core::scheduler::{QueueKind, Scheduler, SchedulerConfig};

    // Logging macros
    pub use spindle_runtime::prelude::*;
}
