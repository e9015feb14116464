//! # Spindle Framework
//!
//! The dispatch machinery built on top of `spindle-core`.
//!
//! This layer provides:
//! - Route table with linear and signature-cached registries
//! - Resolver registry: ordered factories, advice chains and the builtin
//!   converters, parameter resolvers and entity readers/writers
//! - Handler trait turning plain async functions into endpoints
//! - Exception chain with a terminal fallback
//! - The [`Dispatcher`] and the [`Deployment`] that validates and builds it
//!
//! Routing happens on the caller's task. Everything after routing runs on
//! the route's scheduler.

pub mod advice;
pub mod binding;
pub mod deploy;
pub mod dispatcher;
pub mod exception;
pub mod handler;
pub mod resolver;
pub mod route;

pub use advice::{Advice, AdviceChain, Next};
pub use binding::Endpoint;
pub use deploy::{DeployError, Deployment, RouteDefinition, RoutingStrategy};
pub use dispatcher::{Dispatcher, EndpointRoutes};
pub use exception::{
    DefaultExceptionHandler, ExceptionChain, ExceptionChainBuilder, ExceptionHandler,
    ExceptionMapper, ExceptionNext, StatusExceptionHandler, TerminalExceptionHandler,
    map_exception,
};
pub use handler::{Args, BoxedHandler, ErasedHandler, Handler, HandlerFuture, into_handler};
pub use resolver::{
    BindError, Factory, FnFactory, Resolver, ResolverKind, ResolverRegistry,
    ResolverRegistryBuilder,
};
pub use route::{
    AlwaysPromote, CacheConfig, CachedRouteRegistry, LinearRouteRegistry, PromoteEvery,
    PromotionPolicy, Route, RouteRegistry,
};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::deploy::{Deployment, RouteDefinition, RoutingStrategy};
    pub use crate::dispatcher::Dispatcher;
    pub use crate::exception::{ExceptionHandler, ExceptionNext, map_exception};
    pub use crate::resolver::ResolverRegistry;
}
