//! Request body readers and response writers for plain types.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;

use spindle_core::error::{BoxError, ResolveError};
use spindle_core::foundation::{
    FALLBACK_ORDER, HandledValue, HandlerMethod, MediaType, Param, RequestEntity, Response,
    ResponseEntity, Value,
};

use crate::resolver::{Factory, RequestEntityResolver, ResolverRegistry, ResponseEntityResolver};

// =============================================================================
// Readers
// =============================================================================

/// Reads `text/*` bodies in UTF-8 into a `String` or `Option<String>`.
///
/// For `Option<String>` an empty body reads as `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextReader;

impl Factory<Param, RequestEntityResolver> for TextReader {
    fn supports(&self, param: &Param) -> bool {
        let declared = param.declared();
        declared.is::<String>() || declared.is::<Option<String>>()
    }

    fn create(
        &self,
        param: &Param,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<RequestEntityResolver>, BoxError> {
        if param.declared().is::<Option<String>>() {
            let resolver = |entity: &mut RequestEntity| -> Result<HandledValue<Value>, BoxError> {
                if entity.body().is_empty() {
                    return Ok(HandledValue::succeed(Value::new(None::<String>)));
                }
                Ok(read_text(entity)?.map(|text| Value::new(Some(text))))
            };
            return Ok(Arc::new(resolver));
        }
        let resolver = |entity: &mut RequestEntity| -> Result<HandledValue<Value>, BoxError> {
            Ok(read_text(entity)?.map(Value::new))
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        "text-reader"
    }
}

fn read_text(entity: &RequestEntity) -> Result<HandledValue<String>, BoxError> {
    let media_type = entity.media_type();
    let utf8 = media_type
        .charset()
        .is_none_or(|charset| charset.eq_ignore_ascii_case("utf-8"));
    if media_type.ty() != "text" || !utf8 {
        return Ok(HandledValue::failed());
    }
    let text = std::str::from_utf8(entity.body())
        .map_err(|err| ResolveError::conversion(entity.param().name(), err))?;
    Ok(HandledValue::succeed(text.to_string()))
}

/// Reads any body verbatim into `T` or `Option<T>` (`Bytes` or `Vec<u8>`).
pub struct BytesReader<T>(PhantomData<fn() -> T>);

impl<T> Default for BytesReader<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Factory<Param, RequestEntityResolver> for BytesReader<T>
where
    T: From<Bytes> + Any + Send,
{
    fn supports(&self, param: &Param) -> bool {
        let declared = param.declared();
        declared.is::<T>() || declared.is::<Option<T>>()
    }

    fn create(
        &self,
        param: &Param,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<RequestEntityResolver>, BoxError> {
        if param.declared().is::<Option<T>>() {
            let resolver = |entity: &mut RequestEntity| -> Result<HandledValue<Value>, BoxError> {
                let body = entity.body();
                let value = (!body.is_empty()).then(|| T::from(body.clone()));
                Ok(HandledValue::succeed(Value::new(value)))
            };
            return Ok(Arc::new(resolver));
        }
        let resolver = |entity: &mut RequestEntity| -> Result<HandledValue<Value>, BoxError> {
            Ok(HandledValue::succeed(Value::new(T::from(entity.body().clone()))))
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        "bytes-reader"
    }
}

// =============================================================================
// Writers
// =============================================================================

/// Writes a `String` (or `&'static str`) as `text/plain; charset=utf-8`.
///
/// A null value writes an empty body.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextWriter;

impl Factory<HandlerMethod, ResponseEntityResolver> for TextWriter {
    fn supports(&self, method: &HandlerMethod) -> bool {
        let declared = method.return_type();
        declared.is::<String>() || declared.is::<&'static str>()
    }

    fn create(
        &self,
        _method: &HandlerMethod,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<ResponseEntityResolver>, BoxError> {
        Ok(Arc::new(write_text))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        "text-writer"
    }
}

fn write_text(entity: &mut ResponseEntity) -> Result<HandledValue<()>, BoxError> {
    let Some(media_type) = entity.negotiate(&MediaType::text_plain()) else {
        return Ok(HandledValue::failed());
    };
    let value = entity.take_value();
    let text = match value.downcast::<String>() {
        Ok(text) => text.unwrap_or_default(),
        Err(value) => match value.downcast::<&'static str>() {
            Ok(text) => text.unwrap_or_default().to_string(),
            Err(value) => {
                entity.set_value(value);
                return Ok(HandledValue::failed());
            }
        },
    };
    entity.select(media_type.with_param("charset", "utf-8"));
    entity.response_mut().set_body(text);
    Ok(HandledValue::succeed(()))
}

/// Writes `T` (`Bytes` or `Vec<u8>`) as `application/octet-stream`.
pub struct BytesWriter<T>(PhantomData<fn() -> T>);

impl<T> Default for BytesWriter<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Factory<HandlerMethod, ResponseEntityResolver> for BytesWriter<T>
where
    T: Into<Bytes> + Any + Send,
{
    fn supports(&self, method: &HandlerMethod) -> bool {
        method.return_type().is::<T>()
    }

    fn create(
        &self,
        _method: &HandlerMethod,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<ResponseEntityResolver>, BoxError> {
        let resolver = |entity: &mut ResponseEntity| -> Result<HandledValue<()>, BoxError> {
            let Some(media_type) = entity.negotiate(&MediaType::octet_stream()) else {
                return Ok(HandledValue::failed());
            };
            let body: Bytes = match entity.take_value().downcast::<T>() {
                Ok(body) => body.map(Into::into).unwrap_or_default(),
                Err(value) => {
                    entity.set_value(value);
                    return Ok(HandledValue::failed());
                }
            };
            entity.select(media_type);
            entity.response_mut().set_body(body);
            Ok(HandledValue::succeed(()))
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        "bytes-writer"
    }
}

/// Writes nothing for `()`; the response keeps its status and an empty body.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitWriter;

impl Factory<HandlerMethod, ResponseEntityResolver> for UnitWriter {
    fn supports(&self, method: &HandlerMethod) -> bool {
        method.return_type().is::<()>()
    }

    fn create(
        &self,
        _method: &HandlerMethod,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<ResponseEntityResolver>, BoxError> {
        let resolver = |entity: &mut ResponseEntity| -> Result<HandledValue<()>, BoxError> {
            entity.take_value();
            Ok(HandledValue::succeed(()))
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        "unit-writer"
    }
}

/// Sets the response status from a returned [`StatusCode`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusWriter;

impl Factory<HandlerMethod, ResponseEntityResolver> for StatusWriter {
    fn supports(&self, method: &HandlerMethod) -> bool {
        method.return_type().is::<StatusCode>()
    }

    fn create(
        &self,
        _method: &HandlerMethod,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<ResponseEntityResolver>, BoxError> {
        let resolver = |entity: &mut ResponseEntity| -> Result<HandledValue<()>, BoxError> {
            match entity.take_value().downcast::<StatusCode>() {
                Ok(status) => {
                    if let Some(status) = status {
                        entity.response_mut().set_status(status);
                    }
                    Ok(HandledValue::succeed(()))
                }
                Err(value) => {
                    entity.set_value(value);
                    Ok(HandledValue::failed())
                }
            }
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        "status-writer"
    }
}

/// Replaces the response with a returned [`Response`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseWriter;

impl Factory<HandlerMethod, ResponseEntityResolver> for ResponseWriter {
    fn supports(&self, method: &HandlerMethod) -> bool {
        method.return_type().is::<Response>()
    }

    fn create(
        &self,
        _method: &HandlerMethod,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<ResponseEntityResolver>, BoxError> {
        let resolver = |entity: &mut ResponseEntity| -> Result<HandledValue<()>, BoxError> {
            match entity.take_value().downcast::<Response>() {
                Ok(Some(response)) => {
                    *entity.response_mut() = response;
                    Ok(HandledValue::succeed(()))
                }
                Ok(None) => Ok(HandledValue::succeed(())),
                Err(value) => {
                    entity.set_value(value);
                    Ok(HandledValue::failed())
                }
            }
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }

    fn name(&self) -> &str {
        "response-writer"
    }
}
