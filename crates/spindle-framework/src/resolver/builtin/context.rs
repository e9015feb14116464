use std::any::Any;
use std::sync::Arc;

use spindle_core::error::BoxError;
use spindle_core::foundation::{FALLBACK_ORDER, Param, ParamSource, RequestContext, Value};

use crate::resolver::{ContextResolver, Factory, ResolverRegistry};

type Extract<T> = fn(&RequestContext) -> T;

/// Resolves a context argument of type `T` by extracting it from the
/// request context.
pub struct ContextValue<T> {
    extract: Extract<T>,
}

impl<T> ContextValue<T> {
    /// Creates a factory for `T`.
    pub const fn new(extract: Extract<T>) -> Self {
        Self { extract }
    }
}

impl<T: Any + Send> Factory<Param, ContextResolver> for ContextValue<T> {
    fn supports(&self, param: &Param) -> bool {
        matches!(param.source(), ParamSource::Context) && param.declared().is::<T>()
    }

    fn create(
        &self,
        _param: &Param,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<ContextResolver>, BoxError> {
        let extract = self.extract;
        let resolver = move |ctx: &mut RequestContext| -> Result<Value, BoxError> {
            Ok(Value::new(extract(ctx)))
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        std::any::type_name::<T>()
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method};
    use spindle_core::foundation::{ParamSpec, PathMatch, Request, TypeInfo};

    use super::*;

    fn resolve<T: Any>(ctx: &mut RequestContext) -> Value {
        let registry = ResolverRegistry::with_defaults();
        let param = ParamSpec::context().into_param(0, TypeInfo::of::<T>());
        registry.bind_param(&param).unwrap().resolve(ctx).unwrap()
    }

    #[test]
    fn test_context_objects_resolve_by_type() {
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/files/a")
            .header("x-trace", "abc")
            .build()
            .unwrap();
        let mut ctx = RequestContext::new(9, Arc::new(request));
        let mut path = PathMatch::new();
        path.push_variable("name", "a");
        ctx.set_path_match(path);

        let method = resolve::<Method>(&mut ctx);
        assert_eq!(method.downcast_ref::<Method>(), Some(&Method::PUT));

        let headers = resolve::<HeaderMap>(&mut ctx);
        let headers = headers.downcast_ref::<HeaderMap>().unwrap();
        assert_eq!(headers.get("x-trace").unwrap(), "abc");

        let request = resolve::<Arc<Request>>(&mut ctx);
        assert_eq!(request.downcast_ref::<Arc<Request>>().unwrap().path(), "/files/a");

        let path = resolve::<PathMatch>(&mut ctx);
        assert_eq!(path.downcast_ref::<PathMatch>().unwrap().variable("name"), Some("a"));
    }

    #[test]
    fn test_non_context_source_is_not_supported() {
        let factory = ContextValue::<Method>::new(|ctx| ctx.request().method().clone());
        let param = ParamSpec::query("m").into_param(0, TypeInfo::of::<Method>());
        assert!(!factory.supports(&param));
    }
}
