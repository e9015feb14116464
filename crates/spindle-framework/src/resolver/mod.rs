//! Resolver registry.
//!
//! Resolvers turn raw request data into handler arguments and handler return
//! values into responses. They are produced by ordered [`Factory`] lists, one
//! per resolution kind, each with a parallel list of advice factories:
//!
//! | Kind              | Descriptor        | Resolver alias              |
//! |-------------------|-------------------|-----------------------------|
//! | string conversion | `Param`           | [`StringConverter`]         |
//! | parameter         | `Param`           | [`ParamResolver`]           |
//! | context           | `Param`           | [`ContextResolver`]         |
//! | request entity    | `Param`           | [`RequestEntityResolver`]   |
//! | response entity   | `HandlerMethod`   | [`ResponseEntityResolver`]  |
//!
//! Selection happens once per descriptor, when a deployment is built. For
//! string conversion, parameters and context values the first supporting
//! factory wins. Entity factories only match structurally, so every
//! supporting entity resolver is bound and tried per request until one
//! reports [`HandledValue::Handled`].

mod registry;

pub mod builtin;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;

use spindle_core::error::BoxError;
use spindle_core::foundation::{
    DEFAULT_ORDER, HandledValue, OrderedList, RequestContext, RequestEntity, ResponseEntity, Value,
};

use crate::advice::Advice;

pub use registry::{ResolverRegistry, ResolverRegistryBuilder};

/// Converts an input into an output for one descriptor.
///
/// Resolvers are created once and shared by every request, so they must be
/// stateless or synchronize internally.
pub trait Resolver<I: ?Sized, O>: Send + Sync {
    /// Resolves one value.
    fn resolve(&self, input: &mut I) -> Result<O, BoxError>;
}

impl<I, O, F> Resolver<I, O> for F
where
    I: ?Sized,
    F: Fn(&mut I) -> Result<O, BoxError> + Send + Sync,
{
    fn resolve(&self, input: &mut I) -> Result<O, BoxError> {
        self(input)
    }
}

/// Converts an optional raw string into a typed value.
pub type StringConverter = dyn Resolver<Option<String>, Value>;

/// Resolves a handler argument from the request.
pub type ParamResolver = dyn Resolver<RequestContext, Value>;

/// Resolves a framework object from the request context.
pub type ContextResolver = dyn Resolver<RequestContext, Value>;

/// Reads a request body into an argument.
pub type RequestEntityResolver = dyn Resolver<RequestEntity, HandledValue<Value>>;

/// Writes a return value into the response.
pub type ResponseEntityResolver = dyn Resolver<ResponseEntity, HandledValue<()>>;

/// Advice around string conversion.
pub type StringConverterAdvice = dyn Advice<Option<String>, Value>;

/// Advice around parameter and context resolution.
pub type ParamAdvice = dyn Advice<RequestContext, Value>;

/// Advice around request body reading.
pub type RequestEntityAdvice = dyn Advice<RequestEntity, HandledValue<Value>>;

/// Advice around response writing.
pub type ResponseEntityAdvice = dyn Advice<ResponseEntity, HandledValue<()>>;

/// Produces a `T` for descriptors it supports.
///
/// Used for both resolver and advice factories.
pub trait Factory<D: ?Sized, T: ?Sized>: Send + Sync {
    /// Returns true if this factory applies to the descriptor.
    fn supports(&self, descriptor: &D) -> bool;

    /// Creates the resolver or advice. `registry` gives access to the other
    /// resolution kinds, e.g. for a parameter resolver that converts strings.
    fn create(&self, descriptor: &D, registry: &ResolverRegistry) -> Result<Arc<T>, BoxError>;

    /// Lower runs earlier.
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

type SupportsFn<D> = Box<dyn Fn(&D) -> bool + Send + Sync>;
type CreateFn<D, T> = Box<dyn Fn(&D, &ResolverRegistry) -> Result<Arc<T>, BoxError> + Send + Sync>;

/// A factory assembled from closures.
///
/// # Example
///
/// ```rust,ignore
/// let upper = FnFactory::new(
///     "upper",
///     |param: &Param| param.metadata().contains("upper"),
///     |_param, _registry| {
///         let resolver = |raw: &mut Option<String>| -> Result<Value, BoxError> {
///             Ok(Value::from_option(raw.take().map(|s| s.to_uppercase())))
///         };
///         Ok(Arc::new(resolver) as Arc<StringConverter>)
///     },
/// )
/// .with_order(-10);
/// ```
pub struct FnFactory<D: ?Sized, T: ?Sized> {
    name: String,
    order: i32,
    supports: SupportsFn<D>,
    create: CreateFn<D, T>,
    _marker: PhantomData<fn() -> Box<T>>,
}

impl<D: ?Sized, T: ?Sized> FnFactory<D, T> {
    /// Creates a factory at [`DEFAULT_ORDER`].
    pub fn new<S, C>(name: impl Into<String>, supports: S, create: C) -> Self
    where
        S: Fn(&D) -> bool + Send + Sync + 'static,
        C: Fn(&D, &ResolverRegistry) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            order: DEFAULT_ORDER,
            supports: Box::new(supports),
            create: Box::new(create),
            _marker: PhantomData,
        }
    }

    /// Sets the order.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl<D: ?Sized, T: ?Sized> Factory<D, T> for FnFactory<D, T> {
    fn supports(&self, descriptor: &D) -> bool {
        (self.supports)(descriptor)
    }

    fn create(&self, descriptor: &D, registry: &ResolverRegistry) -> Result<Arc<T>, BoxError> {
        (self.create)(descriptor, registry)
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<D: ?Sized, T: ?Sized> fmt::Debug for FnFactory<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFactory")
            .field("name", &self.name)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Factories of one kind in `(order, registration)` order.
pub struct FactoryList<D: ?Sized, T: ?Sized> {
    factories: OrderedList<Arc<dyn Factory<D, T>>>,
}

impl<D: ?Sized, T: ?Sized> Default for FactoryList<D, T> {
    fn default() -> Self {
        Self {
            factories: OrderedList::new(),
        }
    }
}

impl<D: ?Sized, T: ?Sized> Clone for FactoryList<D, T> {
    fn clone(&self) -> Self {
        Self {
            factories: self.factories.clone(),
        }
    }
}

impl<D: ?Sized, T: ?Sized> FactoryList<D, T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory at its own order.
    pub fn push(&mut self, factory: Arc<dyn Factory<D, T>>) {
        self.factories.push(factory.order(), factory);
    }

    /// The first factory supporting `descriptor`.
    pub fn select(&self, descriptor: &D) -> Option<&Arc<dyn Factory<D, T>>> {
        self.factories.iter().find(|f| f.supports(descriptor))
    }

    /// Every factory supporting `descriptor`, in order.
    pub fn select_all<'a>(
        &'a self,
        descriptor: &'a D,
    ) -> impl Iterator<Item = &'a Arc<dyn Factory<D, T>>> + 'a {
        self.factories.iter().filter(move |f| f.supports(descriptor))
    }

    /// All factories in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Factory<D, T>>> {
        self.factories.iter()
    }

    /// Number of factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<D: ?Sized, T: ?Sized> fmt::Debug for FactoryList<D, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.factories.entries().map(|(p, f)| (f.name().to_string(), p.order())))
            .finish()
    }
}

/// The five resolution kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolverKind {
    /// String to typed value.
    StringConversion,
    /// Handler argument.
    Parameter,
    /// Framework object.
    Context,
    /// Request body.
    RequestEntity,
    /// Response body.
    ResponseEntity,
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StringConversion => "string conversion",
            Self::Parameter => "parameter",
            Self::Context => "context",
            Self::RequestEntity => "request entity",
            Self::ResponseEntity => "response entity",
        })
    }
}

/// Errors raised while binding resolvers to descriptors.
#[derive(Debug, Error)]
pub enum BindError {
    /// No factory supports the descriptor.
    #[error("no {kind} resolver supports {target}")]
    NoResolver {
        /// Resolution kind.
        kind: ResolverKind,
        /// The descriptor.
        target: String,
    },

    /// A factory failed to create its resolver or advice.
    #[error("{kind} factory '{factory}' failed for {target}: {source}")]
    Create {
        /// Resolution kind.
        kind: ResolverKind,
        /// Factory name.
        factory: String,
        /// The descriptor.
        target: String,
        /// The factory error.
        #[source]
        source: BoxError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::foundation::{Param, ParamSpec, TypeInfo};

    fn param() -> Param {
        ParamSpec::query("q").into_param(0, TypeInfo::of::<String>())
    }

    fn named(name: &'static str, order: i32, supported: bool) -> Arc<dyn Factory<Param, StringConverter>> {
        Arc::new(
            FnFactory::new(
                name,
                move |_: &Param| supported,
                |_: &Param, _: &ResolverRegistry| -> Result<Arc<StringConverter>, BoxError> {
                    Err("unused".into())
                },
            )
            .with_order(order),
        )
    }

    #[test]
    fn test_select_is_ordered_and_stable() {
        let mut list = FactoryList::new();
        list.push(named("late", 10, true));
        list.push(named("skipped", -5, false));
        list.push(named("first-zero", 0, true));
        list.push(named("second-zero", 0, true));

        let param = param();
        assert_eq!(list.select(&param).unwrap().name(), "first-zero");
        let names: Vec<_> = list.select_all(&param).map(|f| f.name().to_string()).collect();
        assert_eq!(names, ["first-zero", "second-zero", "late"]);
        for _ in 0..3 {
            assert_eq!(list.select(&param).unwrap().name(), "first-zero");
        }
    }

    #[test]
    fn test_bind_error_messages() {
        let err = BindError::NoResolver {
            kind: ResolverKind::Context,
            target: "argument 0".into(),
        };
        assert_eq!(err.to_string(), "no context resolver supports argument 0");
    }
}
