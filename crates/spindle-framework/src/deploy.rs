//! Deployment: explicit registration of routes, schedulers, resolvers and
//! exception handlers, validated and bound once into a [`Dispatcher`].
//!
//! # Example
//!
//! ```rust,ignore
//! async fn show(id: u64, verbose: Option<bool>) -> Result<String, HttpError> {
//!     Ok(format!("user {id} (verbose: {})", verbose.unwrap_or(false)))
//! }
//!
//! let dispatcher = Deployment::new()
//!     .scheduler(Scheduler::new(SchedulerConfig::new("io").workers(4))?)
//!     .route(
//!         RouteDefinition::get("/users/{id}")
//!             .produces("text/plain")
//!             .param(ParamSpec::path("id"))
//!             .param(ParamSpec::query("verbose"))
//!             .handler(show),
//!     )
//!     .routing(RoutingStrategy::cached())
//!     .build()?;
//! ```

use std::fmt;
use std::sync::Arc;

use http::Method;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info};

use spindle_core::foundation::{
    HandlerMethod, MediaType, MediaTypeError, Metadata, ParamSource, ParamSpec,
};
use spindle_core::scheduler::{Scheduler, Schedulers};

use crate::binding::Endpoint;
use crate::dispatcher::{Dispatcher, EndpointRoutes};
use crate::exception::{ExceptionChain, ExceptionChainBuilder, ExceptionHandler, TerminalExceptionHandler};
use crate::handler::{ErasedHandler, Handler};
use crate::resolver::{BindError, ResolverRegistry};
use crate::route::{
    AlwaysPromote, CacheConfig, CachedRouteRegistry, ConditionError, Consumes, HeaderCondition,
    LinearRouteRegistry, PathPattern, PatternError, Produces, PromotionPolicy, Route,
    RouteRegistry,
};

// ============================================================================
// Errors
// ============================================================================

/// Why a deployment could not be built.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Two schedulers share a name.
    #[error("scheduler '{0}' is registered twice")]
    DuplicateScheduler(String),

    /// A route or the default refers to a scheduler that does not exist.
    #[error("route '{route}' refers to unknown scheduler '{scheduler}'")]
    UnknownScheduler {
        /// Route name, or `<default>`.
        route: String,
        /// The scheduler name.
        scheduler: String,
    },

    /// A route names no scheduler and there is no default.
    #[error("route '{route}' has no scheduler and no default scheduler is set")]
    NoScheduler {
        /// Route name.
        route: String,
    },

    /// A route has no handler.
    #[error("route '{route}' has no handler")]
    MissingHandler {
        /// Route name.
        route: String,
    },

    /// The path pattern is invalid.
    #[error("route '{route}': {source}")]
    InvalidPattern {
        /// Route name.
        route: String,
        /// Parse error.
        #[source]
        source: PatternError,
    },

    /// A header predicate is invalid.
    #[error("route '{route}': {source}")]
    InvalidHeader {
        /// Route name.
        route: String,
        /// Parse error.
        #[source]
        source: ConditionError,
    },

    /// A consumes or produces media type is invalid.
    #[error("route '{route}': {source}")]
    InvalidMediaType {
        /// Route name.
        route: String,
        /// Parse error.
        #[source]
        source: MediaTypeError,
    },

    /// The number of parameter specs differs from the handler's arity.
    #[error("route '{route}' declares {declared} parameters but its handler takes {arity}")]
    ArityMismatch {
        /// Route name.
        route: String,
        /// Number of parameter specs.
        declared: usize,
        /// Number of handler arguments.
        arity: usize,
    },

    /// A path parameter names a variable the pattern does not capture.
    #[error("route '{route}' binds unknown path variable '{variable}'")]
    UnknownPathVariable {
        /// Route name.
        route: String,
        /// The variable name.
        variable: String,
    },

    /// Binding resolvers failed.
    #[error("route '{route}': {source}")]
    Bind {
        /// Route name.
        route: String,
        /// Binding error.
        #[source]
        source: BindError,
    },
}

// ============================================================================
// Routing strategy
// ============================================================================

/// Which route table implementation a deployment uses.
#[derive(Clone, Default)]
pub enum RoutingStrategy {
    /// Evaluate every route in registration order.
    #[default]
    Linear,
    /// Cache candidate routes per request signature.
    Cached {
        /// Cache limits.
        config: CacheConfig,
        /// Decides which signatures get cached.
        policy: Arc<dyn PromotionPolicy>,
    },
}

impl RoutingStrategy {
    /// The cached strategy with default limits, promoting every signature.
    pub fn cached() -> Self {
        Self::cached_with(CacheConfig::default(), AlwaysPromote)
    }

    /// The cached strategy with explicit limits and policy.
    pub fn cached_with(config: CacheConfig, policy: impl PromotionPolicy + 'static) -> Self {
        Self::Cached {
            config,
            policy: Arc::new(policy),
        }
    }

    fn build(self, linear: LinearRouteRegistry<Endpoint>) -> EndpointRoutes {
        match self {
            Self::Linear => Arc::new(linear),
            Self::Cached { config, policy } => {
                Arc::new(CachedRouteRegistry::with_policy(linear, config, policy))
            }
        }
    }
}

impl fmt::Debug for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => f.write_str("Linear"),
            Self::Cached { config, .. } => f
                .debug_struct("Cached")
                .field("config", config)
                .finish_non_exhaustive(),
        }
    }
}

// ============================================================================
// Route definitions
// ============================================================================

/// Everything needed to register one endpoint.
///
/// Predicates are kept as strings and parsed when the deployment is built,
/// so mistakes surface as a [`DeployError`] naming the route.
#[derive(Clone, Default)]
pub struct RouteDefinition {
    name: Option<String>,
    methods: Vec<Method>,
    pattern: String,
    headers: Vec<String>,
    consumes: Vec<String>,
    produces: Vec<String>,
    scheduler: Option<String>,
    params: Vec<ParamSpec>,
    metadata: Metadata,
    handler: Option<ErasedHandler>,
}

impl RouteDefinition {
    /// A route matching any method.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    /// A `GET` route.
    pub fn get(pattern: impl Into<String>) -> Self {
        Self::new(pattern).method(Method::GET)
    }

    /// A `POST` route.
    pub fn post(pattern: impl Into<String>) -> Self {
        Self::new(pattern).method(Method::POST)
    }

    /// A `PUT` route.
    pub fn put(pattern: impl Into<String>) -> Self {
        Self::new(pattern).method(Method::PUT)
    }

    /// A `PATCH` route.
    pub fn patch(pattern: impl Into<String>) -> Self {
        Self::new(pattern).method(Method::PATCH)
    }

    /// A `DELETE` route.
    pub fn delete(pattern: impl Into<String>) -> Self {
        Self::new(pattern).method(Method::DELETE)
    }

    /// Adds an accepted method.
    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Names the route for diagnostics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a header predicate: `Name`, `!Name` or `Name=value`.
    pub fn header(mut self, condition: impl Into<String>) -> Self {
        self.headers.push(condition.into());
        self
    }

    /// Adds a consumable media type.
    pub fn consumes(mut self, media_type: impl Into<String>) -> Self {
        self.consumes.push(media_type.into());
        self
    }

    /// Adds a producible media type.
    pub fn produces(mut self, media_type: impl Into<String>) -> Self {
        self.produces.push(media_type.into());
        self
    }

    /// Runs the route on the named scheduler instead of the default.
    pub fn scheduler(mut self, name: impl Into<String>) -> Self {
        self.scheduler = Some(name.into());
        self
    }

    /// Describes the next handler argument.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Adds an endpoint attribute.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Sets a typed handler.
    pub fn handler<F, T>(mut self, handler: F) -> Self
    where
        F: Handler<T>,
        T: 'static,
    {
        self.handler = Some(ErasedHandler::from_fn(handler));
        self
    }

    /// Sets an erased handler.
    pub fn erased(mut self, handler: ErasedHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            if self.methods.is_empty() {
                format!("* {}", self.pattern)
            } else {
                let methods: Vec<_> = self.methods.iter().map(Method::as_str).collect();
                format!("{} {}", methods.join("|"), self.pattern)
            }
        })
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("name", &self.display_name())
            .field("scheduler", &self.scheduler)
            .field("params", &self.params.len())
            .field("handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Deployment
// ============================================================================

/// Collects everything a [`Dispatcher`] needs, then validates and binds it
/// in [`build`](Self::build).
#[derive(Default)]
pub struct Deployment {
    registry: Option<ResolverRegistry>,
    schedulers: Schedulers,
    duplicates: Vec<String>,
    default_scheduler: Option<String>,
    routes: Vec<RouteDefinition>,
    exceptions: ExceptionChainBuilder,
    strategy: RoutingStrategy,
}

impl Deployment {
    /// Creates an empty deployment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `registry` instead of [`ResolverRegistry::with_defaults`].
    pub fn registry(mut self, registry: ResolverRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Registers a scheduler.
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        if let Err(duplicate) = self.schedulers.insert(scheduler) {
            duplicate.shutdown();
            self.duplicates.push(duplicate.name().to_string());
        }
        self
    }

    /// Registers several schedulers.
    pub fn schedulers(self, schedulers: impl IntoIterator<Item = Scheduler>) -> Self {
        schedulers.into_iter().fold(self, Self::scheduler)
    }

    /// Scheduler for routes that do not name one. Without it, a deployment
    /// with a single scheduler uses that one.
    pub fn default_scheduler(mut self, name: impl Into<String>) -> Self {
        self.default_scheduler = Some(name.into());
        self
    }

    /// Registers a route.
    pub fn route(mut self, route: RouteDefinition) -> Self {
        self.routes.push(route);
        self
    }

    /// Adds an exception handler.
    pub fn exception_handler(mut self, handler: impl ExceptionHandler + 'static) -> Self {
        self.exceptions = self.exceptions.handler(handler);
        self
    }

    /// Replaces the terminal exception handler.
    pub fn terminal_exception_handler(
        mut self,
        handler: impl TerminalExceptionHandler + 'static,
    ) -> Self {
        self.exceptions = self.exceptions.terminal(handler);
        self
    }

    /// Chooses the route table implementation.
    pub fn routing(mut self, strategy: RoutingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Validates and binds everything.
    ///
    /// On failure every registered scheduler is shut down.
    pub fn build(self) -> Result<Dispatcher, DeployError> {
        let schedulers = self.schedulers.clone();
        self.try_build().inspect_err(|_| schedulers.shutdown_all())
    }

    fn try_build(self) -> Result<Dispatcher, DeployError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(DeployError::DuplicateScheduler(name));
        }

        let default = match self.default_scheduler {
            Some(name) if !self.schedulers.contains(&name) => {
                return Err(DeployError::UnknownScheduler {
                    route: "<default>".to_string(),
                    scheduler: name,
                });
            }
            Some(name) => Some(name),
            None if self.schedulers.len() == 1 => self.schedulers.names().next().map(str::to_string),
            None => None,
        };

        let registry = self.registry.unwrap_or_else(ResolverRegistry::with_defaults);
        let mut linear = LinearRouteRegistry::new();
        for definition in self.routes {
            let route = bind_route(definition, default.as_deref(), &self.schedulers, &registry)?;
            debug!(route = route.name(), scheduler = route.scheduler(), "Route registered");
            linear.register(route);
        }

        let exceptions: ExceptionChain = self.exceptions.build();
        info!(
            routes = linear.len(),
            schedulers = self.schedulers.len(),
            exception_handlers = exceptions.len(),
            strategy = ?self.strategy,
            "Deployment built"
        );
        Ok(Dispatcher::new(
            self.strategy.build(linear),
            self.schedulers,
            exceptions,
        ))
    }
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployment")
            .field("schedulers", &self.schedulers)
            .field("default_scheduler", &self.default_scheduler)
            .field("routes", &self.routes)
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

fn bind_route(
    definition: RouteDefinition,
    default_scheduler: Option<&str>,
    schedulers: &Schedulers,
    registry: &ResolverRegistry,
) -> Result<Route<Endpoint>, DeployError> {
    let route = definition.display_name();

    let scheduler = match definition.scheduler.as_deref().or(default_scheduler) {
        Some(name) if schedulers.contains(name) => name.to_string(),
        Some(name) => {
            return Err(DeployError::UnknownScheduler {
                route,
                scheduler: name.to_string(),
            });
        }
        None => return Err(DeployError::NoScheduler { route }),
    };

    let Some(handler) = definition.handler else {
        return Err(DeployError::MissingHandler { route });
    };

    let pattern = PathPattern::parse(&definition.pattern).map_err(|source| {
        DeployError::InvalidPattern {
            route: route.clone(),
            source,
        }
    })?;
    let headers = definition
        .headers
        .iter()
        .map(|h| HeaderCondition::parse(h))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| DeployError::InvalidHeader {
            route: route.clone(),
            source,
        })?;
    let parse_types = |types: &[String]| {
        types
            .iter()
            .map(|t| MediaType::parse(t))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| DeployError::InvalidMediaType {
                route: route.clone(),
                source,
            })
    };
    let consumes = parse_types(&definition.consumes)?;
    let produces = parse_types(&definition.produces)?;

    let arg_types = handler.arg_types();
    if arg_types.len() != definition.params.len() {
        return Err(DeployError::ArityMismatch {
            route,
            declared: definition.params.len(),
            arity: arg_types.len(),
        });
    }
    for spec in &definition.params {
        if let ParamSource::Path(variable) = spec.source()
            && !pattern.variables().any(|v| v == variable)
        {
            return Err(DeployError::UnknownPathVariable {
                route,
                variable: variable.clone(),
            });
        }
    }

    let params = definition
        .params
        .into_iter()
        .zip(arg_types.iter().copied())
        .enumerate()
        .map(|(index, (spec, declared))| spec.into_param(index, declared))
        .collect();
    let method = HandlerMethod::new(
        route.clone(),
        params,
        handler.return_type(),
        definition.metadata,
    );
    let endpoint = Endpoint::bind(method, handler, registry).map_err(|source| DeployError::Bind {
        route: route.clone(),
        source,
    })?;

    let mut bound = Route::new(pattern, scheduler, endpoint)
        .with_name(route)
        .with_consumes(Consumes::new(consumes))
        .with_produces(Produces::new(produces));
    for method in definition.methods {
        bound = bound.with_method(method);
    }
    for header in headers {
        bound = bound.with_header(header);
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use spindle_core::error::HttpError;
    use spindle_core::scheduler::SchedulerConfig;

    use super::*;

    async fn echo(name: String) -> Result<String, HttpError> {
        Ok(name)
    }

    fn scheduler(name: &str) -> Scheduler {
        Scheduler::new(SchedulerConfig::new(name).workers(1)).unwrap()
    }

    fn build(deployment: Deployment) -> DeployError {
        deployment.build().unwrap_err()
    }

    #[test]
    fn test_single_scheduler_is_the_default() {
        let dispatcher = Deployment::new()
            .scheduler(scheduler("only"))
            .route(
                RouteDefinition::get("/echo/{name}")
                    .param(ParamSpec::path("name"))
                    .handler(echo),
            )
            .build()
            .unwrap();
        assert_eq!(dispatcher.routes().routes()[0].scheduler(), "only");
        assert_eq!(dispatcher.routes().routes()[0].name(), "GET /echo/{name}");
        dispatcher.shutdown();
    }

    #[test]
    fn test_scheduler_errors() {
        let err = build(
            Deployment::new()
                .scheduler(scheduler("a"))
                .scheduler(scheduler("a")),
        );
        assert!(matches!(err, DeployError::DuplicateScheduler(name) if name == "a"));

        let err = build(Deployment::new().scheduler(scheduler("a")).default_scheduler("b"));
        assert!(matches!(err, DeployError::UnknownScheduler { scheduler, .. } if scheduler == "b"));

        let err = build(
            Deployment::new()
                .scheduler(scheduler("a"))
                .scheduler(scheduler("b"))
                .route(RouteDefinition::get("/").handler(|| async { Ok::<_, HttpError>(()) })),
        );
        assert!(matches!(err, DeployError::NoScheduler { .. }));

        let err = build(
            Deployment::new()
                .scheduler(scheduler("a"))
                .route(
                    RouteDefinition::get("/")
                        .scheduler("missing")
                        .handler(|| async { Ok::<_, HttpError>(()) }),
                ),
        );
        assert!(matches!(err, DeployError::UnknownScheduler { scheduler, .. } if scheduler == "missing"));
    }

    #[test]
    fn test_route_validation_errors() {
        let base = || Deployment::new().scheduler(scheduler("s"));

        let err = build(base().route(RouteDefinition::get("/x")));
        assert!(matches!(err, DeployError::MissingHandler { .. }));

        let err = build(base().route(RouteDefinition::get("x/{").handler(echo).param(ParamSpec::path("x"))));
        assert!(matches!(err, DeployError::InvalidPattern { .. }));

        let err = build(
            base().route(
                RouteDefinition::get("/{name}")
                    .header("=oops")
                    .param(ParamSpec::path("name"))
                    .handler(echo),
            ),
        );
        assert!(matches!(err, DeployError::InvalidHeader { .. }));

        let err = build(
            base().route(
                RouteDefinition::get("/{name}")
                    .produces("not a media type")
                    .param(ParamSpec::path("name"))
                    .handler(echo),
            ),
        );
        assert!(matches!(err, DeployError::InvalidMediaType { .. }));

        let err = build(base().route(RouteDefinition::get("/{name}").handler(echo)));
        assert!(matches!(err, DeployError::ArityMismatch { declared: 0, arity: 1, .. }));

        let err = build(
            base().route(
                RouteDefinition::get("/{name}")
                    .param(ParamSpec::path("nmae"))
                    .handler(echo),
            ),
        );
        assert!(matches!(err, DeployError::UnknownPathVariable { variable, .. } if variable == "nmae"));
    }

    #[test]
    fn test_unbindable_argument_is_reported_with_the_route() {
        struct Opaque;
        let err = build(
            Deployment::new().scheduler(scheduler("s")).route(
                RouteDefinition::post("/opaque")
                    .name("opaque")
                    .param(ParamSpec::body())
                    .handler(|_: Opaque| async { Ok::<_, HttpError>(()) }),
            ),
        );
        match err {
            DeployError::Bind { route, .. } => assert_eq!(route, "opaque"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
