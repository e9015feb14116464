//! A single route: match criteria bound to a target and a scheduler.

use std::fmt;

use http::Method;

use spindle_core::error::MismatchReason;
use spindle_core::foundation::{MediaType, PathMatch, Request};

use super::condition::{Consumes, HeaderCondition, Produces};
use super::pattern::PathPattern;

/// Match criteria plus whatever the route dispatches to.
///
/// Routes are immutable once registered; the builder methods consume and
/// return the route so it can be assembled in one expression.
#[derive(Clone)]
pub struct Route<T> {
    name: Option<String>,
    methods: Vec<Method>,
    pattern: PathPattern,
    headers: Vec<HeaderCondition>,
    consumes: Consumes,
    produces: Produces,
    scheduler: String,
    target: T,
}

/// What a successful evaluation of one route yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Captured path and matrix variables.
    pub path: PathMatch,
    /// Negotiated response media types, best first.
    pub acceptable: Vec<MediaType>,
}

impl<T> Route<T> {
    /// Creates a route accepting every method.
    pub fn new(pattern: PathPattern, scheduler: impl Into<String>, target: T) -> Self {
        Self {
            name: None,
            methods: Vec::new(),
            pattern,
            headers: Vec::new(),
            consumes: Consumes::default(),
            produces: Produces::default(),
            scheduler: scheduler.into(),
            target,
        }
    }

    /// Names the route for diagnostics.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds an accepted method.
    pub fn with_method(mut self, method: Method) -> Self {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
        self
    }

    /// Adds a header predicate.
    pub fn with_header(mut self, condition: HeaderCondition) -> Self {
        self.headers.push(condition);
        self
    }

    /// Sets the consumable media types.
    pub fn with_consumes(mut self, consumes: Consumes) -> Self {
        self.consumes = consumes;
        self
    }

    /// Sets the producible media types.
    pub fn with_produces(mut self, produces: Produces) -> Self {
        self.produces = produces;
        self
    }

    /// The diagnostic name, falling back to the pattern.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.pattern.as_str())
    }

    /// Accepted methods; empty accepts all.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// The path pattern.
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Header predicates.
    pub fn headers(&self) -> &[HeaderCondition] {
        &self.headers
    }

    /// Consumable types.
    pub fn consumes(&self) -> &Consumes {
        &self.consumes
    }

    /// Producible types.
    pub fn produces(&self) -> &Produces {
        &self.produces
    }

    /// The scheduler the route runs on.
    pub fn scheduler(&self) -> &str {
        &self.scheduler
    }

    /// What the route dispatches to.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Returns true if the method is accepted.
    pub fn accepts_method(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    /// Returns true if both method and path pattern accept the request.
    pub fn accepts(&self, method: &Method, path: &str) -> bool {
        self.accepts_method(method) && self.pattern.matches(path).is_some()
    }

    /// Evaluates method, pattern, headers, consumes and produces in that
    /// order and reports the first failing stage.
    ///
    /// A method failure on a path this route does not serve at all is
    /// reported as [`MismatchReason::Pattern`].
    pub fn evaluate(&self, request: &Request) -> Result<Evaluation, MismatchReason> {
        let path = self.pattern.matches(request.path());
        if !self.accepts_method(request.method()) {
            return Err(match path {
                Some(_) => MismatchReason::Method,
                None => MismatchReason::Pattern,
            });
        }
        let path = path.ok_or(MismatchReason::Pattern)?;

        if !self.headers.iter().all(|c| c.matches(request.headers())) {
            return Err(MismatchReason::Header);
        }
        if !self.consumes.matches(request) {
            return Err(MismatchReason::Consumes);
        }
        let acceptable = self
            .produces
            .negotiate(&request.accept())
            .ok_or(MismatchReason::Produces)?;

        Ok(Evaluation { path, acceptable })
    }
}

impl<T> fmt::Debug for Route<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name())
            .field("methods", &self.methods)
            .field("pattern", &self.pattern.as_str())
            .field("headers", &self.headers)
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
