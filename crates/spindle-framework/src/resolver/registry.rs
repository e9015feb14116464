//! The registry of resolver and advice factories, and binding of descriptors
//! to resolver chains.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use spindle_core::error::{BoxError, ResolveError};
use spindle_core::foundation::{
    HandledValue, HandlerMethod, Param, ParamSource, RequestEntity, ResponseEntity, Value,
    join_media_types,
};

use super::builtin;
use super::{
    BindError, ContextResolver, Factory, FactoryList, ParamAdvice, ParamResolver,
    RequestEntityAdvice, RequestEntityResolver, Resolver, ResolverKind, ResponseEntityAdvice,
    ResponseEntityResolver, StringConverter, StringConverterAdvice,
};
use crate::advice::{Advice, AdviceChain};

/// Ordered factory lists for the five resolution kinds and their advices.
///
/// Built once at startup and read concurrently afterwards.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    converters: FactoryList<Param, StringConverter>,
    params: FactoryList<Param, ParamResolver>,
    contexts: FactoryList<Param, ContextResolver>,
    request_entities: FactoryList<Param, RequestEntityResolver>,
    response_entities: FactoryList<HandlerMethod, ResponseEntityResolver>,
    converter_advices: FactoryList<Param, StringConverterAdvice>,
    param_advices: FactoryList<Param, ParamAdvice>,
    context_advices: FactoryList<Param, ParamAdvice>,
    request_entity_advices: FactoryList<Param, RequestEntityAdvice>,
    response_entity_advices: FactoryList<HandlerMethod, ResponseEntityAdvice>,
}

impl ResolverRegistry {
    /// Returns a builder without any factories.
    pub fn builder() -> ResolverRegistryBuilder {
        ResolverRegistryBuilder::default()
    }

    /// A registry holding only the built-in factories.
    pub fn with_defaults() -> Self {
        Self::builder().with_defaults().build()
    }

    /// String conversion factories.
    pub fn converters(&self) -> &FactoryList<Param, StringConverter> {
        &self.converters
    }

    /// Parameter factories.
    pub fn params(&self) -> &FactoryList<Param, ParamResolver> {
        &self.params
    }

    /// Context factories.
    pub fn contexts(&self) -> &FactoryList<Param, ContextResolver> {
        &self.contexts
    }

    /// Request entity factories.
    pub fn request_entities(&self) -> &FactoryList<Param, RequestEntityResolver> {
        &self.request_entities
    }

    /// Response entity factories.
    pub fn response_entities(&self) -> &FactoryList<HandlerMethod, ResponseEntityResolver> {
        &self.response_entities
    }

    /// Binds the string converter of `param`, wrapped in its advices.
    pub fn bind_converter(&self, param: &Param) -> Result<Arc<StringConverter>, BindError> {
        let target = || describe_param(param);
        let converter =
            self.create_first(ResolverKind::StringConversion, &self.converters, param, target)?;
        self.wrap(
            ResolverKind::StringConversion,
            &self.converter_advices,
            param,
            target,
            converter,
        )
    }

    /// Binds the resolver of a handler argument, wrapped in its advices.
    ///
    /// Arguments sourced from [`ParamSource::Context`] use the context
    /// factories, everything else the parameter factories.
    pub fn bind_param(&self, param: &Param) -> Result<Arc<ParamResolver>, BindError> {
        let target = || describe_param(param);
        if let ParamSource::Context = param.source() {
            let resolver = self.create_first(ResolverKind::Context, &self.contexts, param, target)?;
            return self.wrap(ResolverKind::Context, &self.context_advices, param, target, resolver);
        }
        let resolver = self.create_first(ResolverKind::Parameter, &self.params, param, target)?;
        self.wrap(ResolverKind::Parameter, &self.param_advices, param, target, resolver)
    }

    /// Binds every request entity resolver supporting `param` into one
    /// fallback chain, wrapped in its advices.
    ///
    /// Per request the candidates run in order: [`HandledValue::NotHandled`]
    /// falls through to the next one, an error aborts. If no candidate
    /// handles the body the chain fails with
    /// [`ResolveError::UnsupportedMediaType`].
    pub fn bind_request_entities(
        &self,
        param: &Param,
    ) -> Result<Arc<RequestEntityResolver>, BindError> {
        let target = || describe_param(param);
        let candidates = self.create_all(
            ResolverKind::RequestEntity,
            &self.request_entities,
            param,
            target,
        )?;
        let fallback: Arc<RequestEntityResolver> = Arc::new(EntityReaders { candidates });
        self.wrap(
            ResolverKind::RequestEntity,
            &self.request_entity_advices,
            param,
            target,
            fallback,
        )
    }

    /// Binds every response entity resolver supporting `method` into one
    /// fallback chain, wrapped in its advices.
    ///
    /// If no candidate writes the value the chain fails with
    /// [`ResolveError::NotAcceptable`].
    pub fn bind_response(
        &self,
        method: &HandlerMethod,
    ) -> Result<Arc<ResponseEntityResolver>, BindError> {
        let target = || describe_method(method);
        let candidates = self.create_all(
            ResolverKind::ResponseEntity,
            &self.response_entities,
            method,
            target,
        )?;
        let fallback: Arc<ResponseEntityResolver> = Arc::new(EntityWriters { candidates });
        self.wrap(
            ResolverKind::ResponseEntity,
            &self.response_entity_advices,
            method,
            target,
            fallback,
        )
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("converters", &self.converters)
            .field("params", &self.params)
            .field("contexts", &self.contexts)
            .field("request_entities", &self.request_entities)
            .field("response_entities", &self.response_entities)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResolverRegistry`].
#[derive(Default)]
pub struct ResolverRegistryBuilder {
    registry: ResolverRegistry,
}

impl ResolverRegistryBuilder {
    /// Adds the built-in converters, resolvers and entity readers/writers.
    ///
    /// They sit at [`FALLBACK_ORDER`](spindle_core::foundation::FALLBACK_ORDER),
    /// so factories at the default order take precedence.
    pub fn with_defaults(self) -> Self {
        builtin::register(self)
    }

    /// Adds a string conversion factory.
    pub fn converter(mut self, factory: impl Factory<Param, StringConverter> + 'static) -> Self {
        self.registry.converters.push(Arc::new(factory));
        self
    }

    /// Adds a parameter factory.
    pub fn param(mut self, factory: impl Factory<Param, ParamResolver> + 'static) -> Self {
        self.registry.params.push(Arc::new(factory));
        self
    }

    /// Adds a context factory.
    pub fn context(mut self, factory: impl Factory<Param, ContextResolver> + 'static) -> Self {
        self.registry.contexts.push(Arc::new(factory));
        self
    }

    /// Adds a request entity factory.
    pub fn request_entity(
        mut self,
        factory: impl Factory<Param, RequestEntityResolver> + 'static,
    ) -> Self {
        self.registry.request_entities.push(Arc::new(factory));
        self
    }

    /// Adds a response entity factory.
    pub fn response_entity(
        mut self,
        factory: impl Factory<HandlerMethod, ResponseEntityResolver> + 'static,
    ) -> Self {
        self.registry.response_entities.push(Arc::new(factory));
        self
    }

    /// Adds a string conversion advice factory.
    pub fn converter_advice(
        mut self,
        factory: impl Factory<Param, StringConverterAdvice> + 'static,
    ) -> Self {
        self.registry.converter_advices.push(Arc::new(factory));
        self
    }

    /// Adds a parameter advice factory.
    pub fn param_advice(mut self, factory: impl Factory<Param, ParamAdvice> + 'static) -> Self {
        self.registry.param_advices.push(Arc::new(factory));
        self
    }

    /// Adds a context advice factory.
    pub fn context_advice(mut self, factory: impl Factory<Param, ParamAdvice> + 'static) -> Self {
        self.registry.context_advices.push(Arc::new(factory));
        self
    }

    /// Adds a request entity advice factory.
    pub fn request_entity_advice(
        mut self,
        factory: impl Factory<Param, RequestEntityAdvice> + 'static,
    ) -> Self {
        self.registry.request_entity_advices.push(Arc::new(factory));
        self
    }

    /// Adds a response entity advice factory.
    pub fn response_entity_advice(
        mut self,
        factory: impl Factory<HandlerMethod, ResponseEntityAdvice> + 'static,
    ) -> Self {
        self.registry.response_entity_advices.push(Arc::new(factory));
        self
    }

    /// Finishes the registry.
    pub fn build(self) -> ResolverRegistry {
        let registry = self.registry;
        debug!(
            converters = registry.converters.len(),
            params = registry.params.len(),
            contexts = registry.contexts.len(),
            request_entities = registry.request_entities.len(),
            response_entities = registry.response_entities.len(),
            "Resolver registry built"
        );
        registry
    }
}

// =============================================================================
// Binding helpers
// =============================================================================

fn describe_param(param: &Param) -> String {
    format!(
        "argument {} '{}' of type {}",
        param.index(),
        param.name(),
        param.declared().name()
    )
}

fn describe_method(method: &HandlerMethod) -> String {
    format!(
        "return type {} of '{}'",
        method.return_type().name(),
        method.name()
    )
}

impl ResolverRegistry {
    fn create<D: ?Sized, T: ?Sized>(
        &self,
        kind: ResolverKind,
        factory: &Arc<dyn Factory<D, T>>,
        descriptor: &D,
        target: &impl Fn() -> String,
    ) -> Result<Arc<T>, BindError> {
        trace!(%kind, factory = factory.name(), target = %target(), "Creating resolver");
        factory
            .create(descriptor, self)
            .map_err(|source| BindError::Create {
                kind,
                factory: factory.name().to_string(),
                target: target(),
                source,
            })
    }

    fn create_first<D: ?Sized, T: ?Sized>(
        &self,
        kind: ResolverKind,
        list: &FactoryList<D, T>,
        descriptor: &D,
        target: impl Fn() -> String,
    ) -> Result<Arc<T>, BindError> {
        let factory = list.select(descriptor).ok_or_else(|| BindError::NoResolver {
            kind,
            target: target(),
        })?;
        self.create(kind, factory, descriptor, &target)
    }

    fn create_all<D: ?Sized, T: ?Sized>(
        &self,
        kind: ResolverKind,
        list: &FactoryList<D, T>,
        descriptor: &D,
        target: impl Fn() -> String,
    ) -> Result<Vec<Arc<T>>, BindError> {
        let created = list
            .select_all(descriptor)
            .map(|factory| self.create(kind, factory, descriptor, &target))
            .collect::<Result<Vec<_>, _>>()?;
        if created.is_empty() {
            return Err(BindError::NoResolver {
                kind,
                target: target(),
            });
        }
        Ok(created)
    }

    /// Wraps `terminal` in the advices supporting `descriptor`.
    fn wrap<D, I, O>(
        &self,
        kind: ResolverKind,
        advices: &FactoryList<D, dyn Advice<I, O>>,
        descriptor: &D,
        target: impl Fn() -> String,
        terminal: Arc<dyn Resolver<I, O>>,
    ) -> Result<Arc<dyn Resolver<I, O>>, BindError>
    where
        D: ?Sized,
        I: 'static,
        O: 'static,
    {
        let advices = advices
            .select_all(descriptor)
            .map(|factory| self.create(kind, factory, descriptor, &target))
            .collect::<Result<Vec<_>, _>>()?;
        if advices.is_empty() {
            return Ok(terminal);
        }
        trace!(%kind, advices = advices.len(), target = %target(), "Wrapped resolver in advices");
        Ok(Arc::new(AdviceChain::new(advices, terminal)))
    }
}

/// Tries request entity resolvers until one handles the body.
struct EntityReaders {
    candidates: Vec<Arc<RequestEntityResolver>>,
}

impl Resolver<RequestEntity, HandledValue<Value>> for EntityReaders {
    fn resolve(&self, entity: &mut RequestEntity) -> Result<HandledValue<Value>, BoxError> {
        for (position, candidate) in self.candidates.iter().enumerate() {
            match candidate.resolve(entity)? {
                HandledValue::Handled(value) => return Ok(HandledValue::Handled(value)),
                HandledValue::NotHandled => {
                    trace!(position, media_type = %entity.media_type(), "Entity reader declined");
                }
            }
        }
        Err(ResolveError::UnsupportedMediaType {
            media_type: entity.media_type().essence(),
        }
        .into())
    }
}

/// Tries response entity resolvers until one writes the value.
struct EntityWriters {
    candidates: Vec<Arc<ResponseEntityResolver>>,
}

impl Resolver<ResponseEntity, HandledValue<()>> for EntityWriters {
    fn resolve(&self, entity: &mut ResponseEntity) -> Result<HandledValue<()>, BoxError> {
        for (position, candidate) in self.candidates.iter().enumerate() {
            if candidate.resolve(entity)?.is_handled() {
                return Ok(HandledValue::Handled(()));
            }
            trace!(position, "Entity writer declined");
        }
        Err(ResolveError::NotAcceptable {
            acceptable: join_media_types(entity.acceptable()),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::Method;
    use parking_lot::Mutex;
    use spindle_core::foundation::{
        MediaType, Metadata, ParamSpec, Request, RequestContext, TypeInfo,
    };

    use super::*;
    use crate::advice::Next;
    use crate::resolver::FnFactory;

    fn query_param(name: &str) -> Param {
        ParamSpec::query(name).into_param(0, TypeInfo::of::<i32>())
    }

    fn context(target: &str) -> RequestContext {
        RequestContext::new(1, Arc::new(Request::new(Method::GET, target)))
    }

    #[test]
    fn test_selection_is_deterministic_and_idempotent() {
        let created = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&created);
        let custom = FnFactory::new(
            "doubling",
            |param: &Param| param.declared().is::<i32>(),
            move |_: &Param, _: &ResolverRegistry| -> Result<Arc<StringConverter>, BoxError> {
                log.lock().push("doubling");
                let resolver = |raw: &mut Option<String>| -> Result<Value, BoxError> {
                    let n: i32 = raw.take().unwrap_or_default().parse()?;
                    Ok(Value::new(n * 2))
                };
                Ok(Arc::new(resolver))
            },
        );
        let registry = ResolverRegistry::builder()
            .with_defaults()
            .converter(custom)
            .build();

        let param = query_param("n");
        for _ in 0..2 {
            let converter = registry.bind_converter(&param).unwrap();
            let value = converter.resolve(&mut Some("21".into())).unwrap();
            assert_eq!(value.downcast_ref::<i32>(), Some(&42));
        }
        assert_eq!(*created.lock(), ["doubling", "doubling"]);
    }

    #[test]
    fn test_missing_resolver_is_a_bind_error() {
        struct Opaque;
        let registry = ResolverRegistry::with_defaults();
        let param = ParamSpec::query("x").into_param(2, TypeInfo::of::<Opaque>());
        match registry.bind_param(&param) {
            Err(BindError::Create { kind, source, .. }) => {
                assert_eq!(kind, ResolverKind::Parameter);
                assert!(source.to_string().contains("no string conversion resolver"));
            }
            other => panic!("expected a create error, got {:?}", other.err()),
        }

        let param = ParamSpec::context().into_param(0, TypeInfo::of::<Opaque>());
        assert!(matches!(
            registry.bind_param(&param),
            Err(BindError::NoResolver {
                kind: ResolverKind::Context,
                ..
            })
        ));
    }

    #[test]
    fn test_param_advices_wrap_resolution() {
        let registry = ResolverRegistry::builder()
            .with_defaults()
            .param_advice(FnFactory::new(
                "defaulting",
                |_: &Param| true,
                |_: &Param, _: &ResolverRegistry| -> Result<Arc<ParamAdvice>, BoxError> {
                    let advice = |ctx: &mut RequestContext, next: Next<'_, RequestContext, Value>| {
                        next.proceed(ctx).or_else(|_| Ok::<_, BoxError>(Value::new(-1_i32)))
                    };
                    Ok(Arc::new(advice))
                },
            ))
            .build();

        let resolver = registry.bind_param(&query_param("n")).unwrap();
        let value = resolver.resolve(&mut context("/?n=7")).unwrap();
        assert_eq!(value.downcast_ref::<i32>(), Some(&7));
        let value = resolver.resolve(&mut context("/?n=seven")).unwrap();
        assert_eq!(value.downcast_ref::<i32>(), Some(&-1));
    }

    #[test]
    fn test_entity_fallback_tries_candidates_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let reader = |name: &'static str, handles: bool, order: i32| {
            let calls = Arc::clone(&calls);
            FnFactory::new(
                name,
                |param: &Param| param.declared().is::<String>(),
                move |_: &Param, _: &ResolverRegistry| -> Result<Arc<RequestEntityResolver>, BoxError> {
                    let calls = Arc::clone(&calls);
                    let resolver = move |_: &mut RequestEntity| -> Result<HandledValue<Value>, BoxError> {
                        calls.lock().push(name);
                        Ok(if handles {
                            HandledValue::succeed(Value::new(format!("from {name}")))
                        } else {
                            HandledValue::failed()
                        })
                    };
                    Ok(Arc::new(resolver))
                },
            )
            .with_order(order)
        };
        let registry = ResolverRegistry::builder()
            .request_entity(reader("b", true, 2))
            .request_entity(reader("a", false, 1))
            .build();

        let param = Arc::new(ParamSpec::body().into_param(0, TypeInfo::of::<String>()));
        let entities = registry.bind_request_entities(&param).unwrap();
        let mut entity = RequestEntity::new(param, MediaType::text_plain(), Bytes::from("x"));
        let value = entities.resolve(&mut entity).unwrap().into_option().unwrap();

        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("from b"));
        assert_eq!(*calls.lock(), ["a", "b"]);
    }

    #[test]
    fn test_unhandled_response_is_not_acceptable() {
        let registry = ResolverRegistry::with_defaults();
        let method = HandlerMethod::new(
            "text",
            Vec::new(),
            TypeInfo::of::<String>(),
            Metadata::new(),
        );
        let writer = registry.bind_response(&method).unwrap();
        let mut entity = spindle_core::foundation::ResponseEntity::new(
            Arc::new(method),
            Value::new("hi".to_string()),
            vec![MediaType::parse("image/png").unwrap()],
            Default::default(),
        );
        let err = writer.resolve(&mut entity).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::NotAcceptable { .. })
        ));
    }
}
