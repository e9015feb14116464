//! Per-request entity wrappers handed to the entity resolvers.
//!
//! An entity bundles the static descriptor with the runtime payload and the
//! negotiated media type. Entities are created for one resolution, owned by
//! it and dropped afterwards.

use std::sync::Arc;

use bytes::Bytes;

use super::descriptor::{HandlerMethod, Metadata, Param, TypeInfo};
use super::media::MediaType;
use super::response::Response;
use super::value::Value;

/// The request body on its way to a handler argument.
#[derive(Debug)]
pub struct RequestEntity {
    param: Arc<Param>,
    media_type: MediaType,
    body: Bytes,
}

impl RequestEntity {
    /// Creates an entity for `param`.
    pub fn new(param: Arc<Param>, media_type: MediaType, body: Bytes) -> Self {
        Self {
            param,
            media_type,
            body,
        }
    }

    /// The argument descriptor.
    pub fn param(&self) -> &Param {
        &self.param
    }

    /// The declared argument type.
    pub fn declared(&self) -> TypeInfo {
        self.param.declared()
    }

    /// The element type, if recorded.
    pub fn generic(&self) -> Option<TypeInfo> {
        self.param.generic()
    }

    /// Descriptor attributes.
    pub fn metadata(&self) -> &Metadata {
        self.param.metadata()
    }

    /// The request media type.
    pub fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Overrides the media type, e.g. from an advice.
    pub fn set_media_type(&mut self, media_type: MediaType) {
        self.media_type = media_type;
    }

    /// The payload.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replaces the payload.
    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }
}

/// A handler return value on its way to the response.
///
/// The entity owns the response while the response-entity resolvers run;
/// the dispatcher takes it back afterwards.
#[derive(Debug)]
pub struct ResponseEntity {
    method: Arc<HandlerMethod>,
    value: Value,
    acceptable: Vec<MediaType>,
    selected: Option<MediaType>,
    response: Response,
}

impl ResponseEntity {
    /// Creates an entity. `acceptable` is the negotiated list, best first.
    pub fn new(
        method: Arc<HandlerMethod>,
        value: Value,
        acceptable: Vec<MediaType>,
        response: Response,
    ) -> Self {
        Self {
            method,
            value,
            acceptable,
            selected: None,
            response,
        }
    }

    /// The endpoint descriptor.
    pub fn method(&self) -> &HandlerMethod {
        &self.method
    }

    /// The handler's declared success type.
    pub fn declared(&self) -> TypeInfo {
        self.method.return_type()
    }

    /// Descriptor attributes of the endpoint.
    pub fn metadata(&self) -> &Metadata {
        self.method.metadata()
    }

    /// The value to write.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Takes the value, leaving null.
    pub fn take_value(&mut self) -> Value {
        std::mem::take(&mut self.value)
    }

    /// Replaces the value.
    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    /// Acceptable media types, best first.
    pub fn acceptable(&self) -> &[MediaType] {
        &self.acceptable
    }

    /// The first acceptable type compatible with `candidate`, made concrete.
    pub fn negotiate(&self, candidate: &MediaType) -> Option<MediaType> {
        self.acceptable
            .iter()
            .find(|accepted| accepted.is_compatible_with(candidate))
            .map(|accepted| accepted.most_specific(candidate).clone())
    }

    /// The media type chosen by the writing resolver.
    pub fn selected(&self) -> Option<&MediaType> {
        self.selected.as_ref()
    }

    /// Records the chosen media type and sets the `Content-Type`.
    pub fn select(&mut self, media_type: MediaType) {
        self.response.set_content_type(&media_type);
        self.selected = Some(media_type);
    }

    /// The response being written.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the response being written.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Gives the response back.
    pub fn into_response(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::descriptor::Metadata;

    fn entity(acceptable: &str) -> ResponseEntity {
        let method = HandlerMethod::new("m", Vec::new(), TypeInfo::of::<String>(), Metadata::new());
        ResponseEntity::new(
            Arc::new(method),
            Value::new(String::from("x")),
            MediaType::parse_list(acceptable),
            Response::default(),
        )
    }

    #[test]
    fn test_negotiate_picks_concrete_type() {
        let entity = entity("application/json, text/*;q=0.5");
        let chosen = entity.negotiate(&MediaType::text_plain()).unwrap();
        assert_eq!(chosen.essence(), "text/plain");
        assert!(entity.negotiate(&MediaType::octet_stream()).is_none());
    }

    #[test]
    fn test_select_sets_content_type() {
        let mut entity = entity("*/*");
        entity.select(MediaType::text_plain());
        assert_eq!(
            entity.response().content_type().map(|m| m.essence()),
            Some("text/plain".to_string())
        );
    }
}
