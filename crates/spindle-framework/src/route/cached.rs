//! Cache-accelerated route registry.
//!
//! The cache maps a [`RequestSignature`] (method and normalized path) to the
//! registration-ordered indices of the routes whose method and pattern accept
//! it. A cached lookup evaluates only those candidates, still checking
//! headers and media types per request, so the result is always the one the
//! linear registry would produce:
//!
//! - a route outside the candidate list fails on method or pattern, which is
//!   less specific than any failure a candidate can report;
//! - candidates keep registration order, so the first match is unchanged.
//!
//! Signatures with no candidates are never cached. Routes are immutable, so
//! entries are never invalidated; the cache simply stops growing at
//! `capacity`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace};

use spindle_core::error::MismatchReason;
use spindle_core::foundation::{Request, RequestSignature};

use super::linear::{LinearRouteRegistry, select};
use super::route::Route;
use super::{RouteMatch, RouteRegistry};

/// Decides whether a signature seen on a cache miss is worth caching.
pub trait PromotionPolicy: Send + Sync {
    /// Called on a miss. `lookups` is the total number of lookups so far,
    /// including this one.
    fn should_promote(&self, signature: &RequestSignature, lookups: u64) -> bool;
}

impl<F> PromotionPolicy for F
where
    F: Fn(&RequestSignature, u64) -> bool + Send + Sync,
{
    fn should_promote(&self, signature: &RequestSignature, lookups: u64) -> bool {
        self(signature, lookups)
    }
}

/// Promotes every missed signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPromote;

impl PromotionPolicy for AlwaysPromote {
    fn should_promote(&self, _signature: &RequestSignature, _lookups: u64) -> bool {
        true
    }
}

/// Promotes on every `n`-th lookup, sampling the traffic.
#[derive(Debug, Clone, Copy)]
pub struct PromoteEvery(u64);

impl PromoteEvery {
    /// Creates the policy. `0` is treated as `1`.
    pub fn new(n: u64) -> Self {
        Self(n.max(1))
    }
}

impl PromotionPolicy for PromoteEvery {
    fn should_promote(&self, _signature: &RequestSignature, lookups: u64) -> bool {
        lookups % self.0 == 0
    }
}

/// Limits of the route cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// The cache is only used with more routes than this.
    pub min_routes: usize,
    /// Maximum number of cached signatures.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            min_routes: 10,
            capacity: 4096,
        }
    }
}

/// Wraps a [`LinearRouteRegistry`] with a signature cache.
pub struct CachedRouteRegistry<T> {
    linear: LinearRouteRegistry<T>,
    config: CacheConfig,
    policy: Arc<dyn PromotionPolicy>,
    cache: RwLock<HashMap<RequestSignature, Arc<[usize]>>>,
    lookups: AtomicU64,
    hits: AtomicU64,
}

impl<T: Send + Sync> CachedRouteRegistry<T> {
    /// Wraps `linear`, promoting every missed signature.
    pub fn new(linear: LinearRouteRegistry<T>, config: CacheConfig) -> Self {
        Self::with_policy(linear, config, Arc::new(AlwaysPromote))
    }

    /// Wraps `linear` with a custom promotion policy.
    pub fn with_policy(
        linear: LinearRouteRegistry<T>,
        config: CacheConfig,
        policy: Arc<dyn PromotionPolicy>,
    ) -> Self {
        Self {
            linear,
            config,
            policy,
            cache: RwLock::new(HashMap::new()),
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Returns true if there are enough routes for the cache to be used.
    pub fn is_active(&self) -> bool {
        self.linear.routes().len() > self.config.min_routes
    }

    /// Number of cached signatures.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    /// Lookups served so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Lookups answered from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    fn promote(&self, signature: RequestSignature) {
        let candidates: Arc<[usize]> = self
            .linear
            .routes()
            .iter()
            .enumerate()
            .filter(|(_, route)| route.accepts(signature.method(), signature.path()))
            .map(|(index, _)| index)
            .collect();
        if candidates.is_empty() {
            return;
        }

        let mut cache = self.cache.write();
        if cache.len() >= self.config.capacity || cache.contains_key(&signature) {
            return;
        }
        debug!(%signature, candidates = candidates.len(), "Promoted request signature");
        cache.insert(signature, candidates);
    }
}

impl<T: Send + Sync> RouteRegistry<T> for CachedRouteRegistry<T> {
    fn route(&self, request: &Request) -> Result<RouteMatch<'_, T>, MismatchReason> {
        let lookups = self.lookups.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.is_active() {
            return self.linear.route(request);
        }

        let signature = request.signature();
        let cached = self.cache.read().get(&signature).cloned();
        if let Some(candidates) = cached {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(%signature, "Route cache hit");
            return select(self.linear.routes(), candidates.iter().copied(), request);
        }

        let result = self.linear.route(request);
        if self.policy.should_promote(&signature, lookups) {
            self.promote(signature);
        }
        result
    }

    fn routes(&self) -> &[Route<T>] {
        self.linear.routes()
    }
}

impl<T: Send + Sync> fmt::Debug for CachedRouteRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedRouteRegistry")
            .field("routes", &self.linear.routes().len())
            .field("config", &self.config)
            .field("cached", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}
