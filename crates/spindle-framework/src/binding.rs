//! Endpoints: a handler bound to its resolver chains.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use spindle_core::error::{BoxError, ResolveError};
use spindle_core::foundation::{
    HandledValue, HandlerMethod, MediaType, RequestContext, ResponseEntity, Value,
    join_media_types,
};

use crate::handler::{Args, ErasedHandler, HandlerFuture};
use crate::resolver::{BindError, ParamResolver, ResolverRegistry, ResponseEntityResolver};

/// A handler with one bound resolver per argument and a bound response
/// writer. Binding happens once; every request reuses the same resolvers.
#[derive(Clone)]
pub struct Endpoint {
    method: Arc<HandlerMethod>,
    params: Arc<[Arc<ParamResolver>]>,
    response: Arc<ResponseEntityResolver>,
    handler: ErasedHandler,
}

impl Endpoint {
    /// Binds every argument of `method` and its return type.
    pub fn bind(
        method: HandlerMethod,
        handler: ErasedHandler,
        registry: &ResolverRegistry,
    ) -> Result<Self, BindError> {
        let params = method
            .params()
            .iter()
            .map(|param| registry.bind_param(param))
            .collect::<Result<Vec<_>, _>>()?;
        let response = registry.bind_response(&method)?;
        trace!(endpoint = method.name(), params = params.len(), "Bound endpoint");
        Ok(Self {
            method: Arc::new(method),
            params: params.into(),
            response,
            handler,
        })
    }

    /// The endpoint descriptor.
    pub fn method(&self) -> &HandlerMethod {
        &self.method
    }

    /// The handler.
    pub fn handler(&self) -> &ErasedHandler {
        &self.handler
    }

    /// Resolves every argument in order. The first failure aborts.
    pub fn resolve_args(&self, ctx: &mut RequestContext) -> Result<Vec<Value>, BoxError> {
        self.params
            .iter()
            .map(|resolver| resolver.resolve(ctx))
            .collect()
    }

    /// Starts the handler with resolved arguments.
    pub fn invoke(&self, args: Vec<Value>) -> Result<HandlerFuture, ResolveError> {
        self.handler.call(Args::new(args))
    }

    /// Writes the handler's value into the context's response.
    ///
    /// The response is moved into a [`ResponseEntity`] for the writers and
    /// put back afterwards, whether or not writing succeeded.
    pub fn write_response(
        &self,
        ctx: &mut RequestContext,
        value: Value,
        acceptable: Vec<MediaType>,
    ) -> Result<(), BoxError> {
        let response = ctx.take_response();
        let mut entity = ResponseEntity::new(Arc::clone(&self.method), value, acceptable, response);
        let result = self.response.resolve(&mut entity);
        let not_acceptable = || ResolveError::NotAcceptable {
            acceptable: join_media_types(entity.acceptable()),
        };
        let result = match result {
            Ok(HandledValue::Handled(())) => Ok(()),
            Ok(HandledValue::NotHandled) => Err(not_acceptable().into()),
            Err(err) => Err(err),
        };
        ctx.set_response(entity.into_response());
        result
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("method", &self.method.name())
            .field("params", &self.params.len())
            .field("handler", &self.handler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};
    use spindle_core::error::HttpError;
    use spindle_core::foundation::{Metadata, ParamSpec, Request, TypeInfo};

    use super::*;

    fn endpoint() -> Endpoint {
        let handler = ErasedHandler::from_fn(|name: String, n: Option<u32>| async move {
            Ok::<_, HttpError>(format!("{name}:{}", n.unwrap_or(0)))
        });
        let params = vec![
            ParamSpec::path("name").into_param(0, handler.arg_types()[0]),
            ParamSpec::query("n").into_param(1, handler.arg_types()[1]),
        ];
        let method = HandlerMethod::new("show", params, handler.return_type(), Metadata::new());
        Endpoint::bind(method, handler, &ResolverRegistry::with_defaults()).unwrap()
    }

    fn context(target: &str) -> RequestContext {
        let mut ctx = RequestContext::new(1, Arc::new(Request::new(Method::GET, target)));
        let mut path = spindle_core::foundation::PathMatch::new();
        path.push_variable("name", "ada");
        ctx.set_path_match(path);
        ctx
    }

    #[tokio::test]
    async fn test_resolve_invoke_and_write() {
        let endpoint = endpoint();
        let mut ctx = context("/users/ada?n=3");

        let args = endpoint.resolve_args(&mut ctx).unwrap();
        let value = endpoint.invoke(args).unwrap().await.unwrap();
        endpoint
            .write_response(&mut ctx, value, vec![MediaType::all()])
            .unwrap();

        assert_eq!(ctx.response().status(), StatusCode::OK);
        assert_eq!(ctx.response().body().as_ref(), b"ada:3");
    }

    #[test]
    fn test_failed_write_keeps_the_response() {
        let endpoint = endpoint();
        let mut ctx = context("/users/ada");
        ctx.response_mut().set_status(StatusCode::ACCEPTED);

        let err = endpoint
            .write_response(
                &mut ctx,
                Value::new("x".to_string()),
                vec![MediaType::application_json()],
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::NotAcceptable { acceptable }) if acceptable == "application/json"
        ));
        assert_eq!(ctx.response().status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_bind_reports_unresolvable_arguments() {
        struct Opaque;
        let handler = ErasedHandler::from_fn(|_: Opaque| async { Ok::<_, HttpError>(()) });
        let method = HandlerMethod::new(
            "opaque",
            vec![ParamSpec::context().into_param(0, TypeInfo::of::<Opaque>())],
            handler.return_type(),
            Metadata::new(),
        );
        let err = Endpoint::bind(method, handler, &ResolverRegistry::with_defaults()).unwrap_err();
        assert!(matches!(err, BindError::NoResolver { .. }));
    }
}
