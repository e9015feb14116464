use std::sync::Arc;

use spindle_core::error::{BoxError, ResolveError};
use spindle_core::foundation::{
    FALLBACK_ORDER, HandledValue, MediaType, Param, ParamSource, RequestContext, RequestEntity,
    Value,
};

use crate::resolver::{Factory, ParamResolver, ResolverRegistry};

/// Resolves path, matrix, query and header arguments: looks up the raw
/// string and hands it to the argument's string converter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NamedValueParam;

impl Factory<Param, ParamResolver> for NamedValueParam {
    fn supports(&self, param: &Param) -> bool {
        matches!(
            param.source(),
            ParamSource::Path(_)
                | ParamSource::Matrix { .. }
                | ParamSource::Query(_)
                | ParamSource::Header(_)
        )
    }

    fn create(
        &self,
        param: &Param,
        registry: &ResolverRegistry,
    ) -> Result<Arc<ParamResolver>, BoxError> {
        let converter = registry.bind_converter(param)?;
        let source = param.source().clone();
        let resolver = move |ctx: &mut RequestContext| -> Result<Value, BoxError> {
            let mut raw = lookup(&source, ctx);
            converter.resolve(&mut raw)
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        "named-value"
    }
}

fn lookup(source: &ParamSource, ctx: &RequestContext) -> Option<String> {
    match source {
        ParamSource::Path(name) => ctx.path_variable(name).map(str::to_string),
        ParamSource::Matrix { path_var, name } => {
            ctx.matrix_variable(path_var, name).map(str::to_string)
        }
        ParamSource::Query(name) => ctx.request().query_param(name),
        ParamSource::Header(name) => ctx.request().header(name).map(str::to_string),
        ParamSource::Body | ParamSource::Context | ParamSource::Custom(_) => None,
    }
}

/// Resolves a body argument through the request entity readers.
///
/// The body's `Content-Type` picks the reader, defaulting to
/// `application/octet-stream`. An empty body is a missing value for required
/// arguments; optional ones still go through the readers, so an
/// `Option<T>` argument can read it as `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BodyParam;

impl Factory<Param, ParamResolver> for BodyParam {
    fn supports(&self, param: &Param) -> bool {
        matches!(param.source(), ParamSource::Body)
    }

    fn create(
        &self,
        param: &Param,
        registry: &ResolverRegistry,
    ) -> Result<Arc<ParamResolver>, BoxError> {
        let readers = registry.bind_request_entities(param)?;
        let param = Arc::new(param.clone());
        let resolver = move |ctx: &mut RequestContext| -> Result<Value, BoxError> {
            let request = ctx.request();
            let body = request.body().clone();
            if body.is_empty() && param.is_required() {
                return Err(ResolveError::missing(param.name()).into());
            }
            let media_type = request
                .content_type()
                .unwrap_or_else(MediaType::octet_stream);
            let mut entity = RequestEntity::new(Arc::clone(&param), media_type, body);
            match readers.resolve(&mut entity)? {
                HandledValue::Handled(value) => Ok(value),
                HandledValue::NotHandled => Err(ResolveError::UnsupportedMediaType {
                    media_type: entity.media_type().essence(),
                }
                .into()),
            }
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        "body"
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use spindle_core::foundation::{ParamSpec, PathMatch, Request, TypeInfo};

    use super::*;
    use crate::resolver::BindError;

    fn resolve(spec: ParamSpec, declared: TypeInfo, ctx: &mut RequestContext) -> Result<Value, BoxError> {
        let registry = ResolverRegistry::with_defaults();
        let param = spec.into_param(0, declared);
        registry.bind_param(&param).unwrap().resolve(ctx)
    }

    fn context(request: Request) -> RequestContext {
        RequestContext::new(1, Arc::new(request))
    }

    #[test]
    fn test_query_and_header_values_are_converted() {
        let request = Request::builder()
            .uri("/search?limit=%2025&q=a%20b")
            .header("X-Page", "3")
            .build()
            .unwrap();
        let mut ctx = context(request);

        let limit = resolve(ParamSpec::query("limit"), TypeInfo::of::<u32>(), &mut ctx).unwrap();
        assert_eq!(limit.downcast_ref::<u32>(), Some(&25));
        let q = resolve(ParamSpec::query("q"), TypeInfo::of::<String>(), &mut ctx).unwrap();
        assert_eq!(q.downcast_ref::<String>().map(String::as_str), Some("a b"));
        let page = resolve(ParamSpec::header("x-page"), TypeInfo::of::<i64>(), &mut ctx).unwrap();
        assert_eq!(page.downcast_ref::<i64>(), Some(&3));
    }

    #[test]
    fn test_missing_values() {
        let mut ctx = context(Request::new(Method::GET, "/"));

        let err = resolve(ParamSpec::query("id"), TypeInfo::of::<u64>(), &mut ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::MissingParameter { name }) if name == "id"
        ));

        let value = resolve(ParamSpec::query("id").optional(), TypeInfo::of::<u64>(), &mut ctx).unwrap();
        assert!(value.is_null());

        let value = resolve(
            ParamSpec::query("size").default_value("10"),
            TypeInfo::of::<u64>(),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(value.downcast_ref::<u64>(), Some(&10));

        let value = resolve(ParamSpec::query("size"), TypeInfo::of::<Option<u64>>(), &mut ctx).unwrap();
        assert_eq!(value.downcast_ref::<Option<u64>>(), Some(&None));
    }

    #[test]
    fn test_conversion_failure_names_the_argument() {
        let mut ctx = context(Request::new(Method::GET, "/?n=abc"));
        let err = resolve(ParamSpec::query("n"), TypeInfo::of::<i32>(), &mut ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::Conversion { name, .. }) if name == "n"
        ));
    }

    #[test]
    fn test_path_and_matrix_values() {
        let mut ctx = context(Request::new(Method::GET, "/cars/a;color=red/7"));
        let mut path = PathMatch::new();
        path.push_variable("id", "7");
        path.push_matrix("make", "color", "red");
        ctx.set_path_match(path);

        let id = resolve(ParamSpec::path("id"), TypeInfo::of::<u16>(), &mut ctx).unwrap();
        assert_eq!(id.downcast_ref::<u16>(), Some(&7));
        let color = resolve(
            ParamSpec::matrix("make", "color"),
            TypeInfo::of::<String>(),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(color.downcast_ref::<String>().map(String::as_str), Some("red"));
    }

    #[test]
    fn test_body_is_read_by_entity_readers() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/notes")
            .header("content-type", "text/plain; charset=utf-8")
            .body("hello")
            .build()
            .unwrap();
        let mut ctx = context(request);
        let value = resolve(ParamSpec::body(), TypeInfo::of::<String>(), &mut ctx).unwrap();
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("hello"));

        let mut empty = context(Request::new(Method::POST, "/notes"));
        let err = resolve(ParamSpec::body(), TypeInfo::of::<String>(), &mut empty).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::MissingParameter { .. })
        ));
        let value = resolve(
            ParamSpec::body().optional(),
            TypeInfo::of::<Option<String>>(),
            &mut empty,
        )
        .unwrap();
        assert_eq!(value.downcast_ref::<Option<String>>(), Some(&None));
    }

    #[test]
    fn test_unreadable_body_is_unsupported_media_type() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/notes")
            .header("content-type", "application/json")
            .body("{}")
            .build()
            .unwrap();
        let mut ctx = context(request);
        let err = resolve(ParamSpec::body(), TypeInfo::of::<String>(), &mut ctx).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::UnsupportedMediaType { media_type }) if media_type == "application/json"
        ));
    }

    #[test]
    fn test_body_of_unknown_type_fails_to_bind() {
        struct Payload;
        let registry = ResolverRegistry::with_defaults();
        let param = ParamSpec::body().into_param(0, TypeInfo::of::<Payload>());
        match registry.bind_param(&param) {
            Err(BindError::Create { source, .. }) => {
                assert!(source.to_string().contains("no request entity resolver"));
            }
            Err(other) => panic!("unexpected bind error: {other}"),
            Ok(_) => panic!("a body of unknown type should not bind"),
        }
    }
}
