//! Linear route registry.

use tracing::trace;

use spindle_core::error::MismatchReason;
use spindle_core::foundation::Request;

use super::route::Route;
use super::{RouteMatch, RouteRegistry};

/// Evaluates every route in registration order.
#[derive(Debug, Clone)]
pub struct LinearRouteRegistry<T> {
    routes: Vec<Route<T>>,
}

impl<T> Default for LinearRouteRegistry<T> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<T> LinearRouteRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route; earlier routes win ties.
    pub fn register(&mut self, route: Route<T>) {
        self.routes.push(route);
    }
}

impl<T> FromIterator<Route<T>> for LinearRouteRegistry<T> {
    fn from_iter<I: IntoIterator<Item = Route<T>>>(iter: I) -> Self {
        Self {
            routes: iter.into_iter().collect(),
        }
    }
}

impl<T: Send + Sync> RouteRegistry<T> for LinearRouteRegistry<T> {
    fn route(&self, request: &Request) -> Result<RouteMatch<'_, T>, MismatchReason> {
        select(&self.routes, 0..self.routes.len(), request)
    }

    fn routes(&self) -> &[Route<T>] {
        &self.routes
    }
}

/// Evaluates `candidates` in order and returns the first match, or the most
/// specific failure. Equal specificity keeps the earliest route's reason.
pub(crate) fn select<'a, T>(
    routes: &'a [Route<T>],
    candidates: impl IntoIterator<Item = usize>,
    request: &Request,
) -> Result<RouteMatch<'a, T>, MismatchReason> {
    let mut best = MismatchReason::Pattern;
    for index in candidates {
        let Some(route) = routes.get(index) else {
            continue;
        };
        match route.evaluate(request) {
            Ok(evaluation) => {
                trace!(route = route.name(), index, "Route matched");
                return Ok(RouteMatch {
                    route,
                    index,
                    path: evaluation.path,
                    acceptable: evaluation.acceptable,
                });
            }
            Err(reason) => {
                if reason.specificity() > best.specificity() {
                    best = reason;
                }
            }
        }
    }
    trace!(reason = %best, "No route matched");
    Err(best)
}
