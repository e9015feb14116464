//! Route table.
//!
//! A [`Route`] is evaluated in a fixed order: method, path pattern, header
//! predicates, consumes, produces. When no route accepts a request, the
//! registry reports the most specific failing stage as a
//! [`MismatchReason`], which the exception chain maps to a status.
//!
//! Two registries implement [`RouteRegistry`] with identical observable
//! behavior: [`LinearRouteRegistry`] and the signature-caching
//! [`CachedRouteRegistry`].
//!
//! # Example
//!
//! ```rust,ignore
//! use spindle_framework::route::{LinearRouteRegistry, PathPattern, Route, RouteRegistry};
//!
//! let mut routes = LinearRouteRegistry::new();
//! routes.register(
//!     Route::new(PathPattern::parse("/users/{id}")?, "default", "user")
//!         .with_method(Method::GET),
//! );
//!
//! let matched = routes.route(&Request::new(Method::GET, "/users/7"))?;
//! assert_eq!(matched.path().variable("id"), Some("7"));
//! ```

mod cached;
mod condition;
mod linear;
mod pattern;
#[allow(clippy::module_inception)]
mod route;

use spindle_core::error::MismatchReason;
use spindle_core::foundation::{MediaType, PathMatch, Request};

pub use cached::{AlwaysPromote, CacheConfig, CachedRouteRegistry, PromoteEvery, PromotionPolicy};
pub use condition::{ConditionError, Consumes, HeaderCondition, Produces};
pub use linear::LinearRouteRegistry;
pub use pattern::{PathPattern, PatternError};
pub use route::{Evaluation, Route};

/// A set of routes that can be matched against a request.
pub trait RouteRegistry<T>: Send + Sync {
    /// Returns the first accepting route, or the most specific failure.
    fn route(&self, request: &Request) -> Result<RouteMatch<'_, T>, MismatchReason>;

    /// The registered routes in registration order.
    fn routes(&self) -> &[Route<T>];

    /// Number of routes.
    fn len(&self) -> usize {
        self.routes().len()
    }

    /// Returns true if there are no routes.
    fn is_empty(&self) -> bool {
        self.routes().is_empty()
    }
}

/// A route accepting a request, with what matching extracted.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    route: &'a Route<T>,
    index: usize,
    path: PathMatch,
    acceptable: Vec<MediaType>,
}

impl<'a, T> RouteMatch<'a, T> {
    /// The matched route.
    pub fn route(&self) -> &'a Route<T> {
        self.route
    }

    /// What the route dispatches to.
    pub fn target(&self) -> &'a T {
        self.route.target()
    }

    /// Registration index of the route.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Captured path variables.
    pub fn path(&self) -> &PathMatch {
        &self.path
    }

    /// Negotiated response media types, best first.
    pub fn acceptable(&self) -> &[MediaType] {
        &self.acceptable
    }

    /// Splits into the route, path variables and acceptable media types.
    pub fn into_parts(self) -> (&'a Route<T>, PathMatch, Vec<MediaType>) {
        (self.route, self.path, self.acceptable)
    }
}
