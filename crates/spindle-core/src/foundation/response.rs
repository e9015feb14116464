//! The outbound response under construction.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::warn;

use super::media::MediaType;

/// A response being built for one request.
///
/// Once [`commit`](Self::commit) has been called the bytes are considered
/// flushed to the transport: further writes are ignored and logged, and
/// exception handlers use [`is_committed`](Self::is_committed) to avoid
/// writing twice.
#[derive(Debug, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    committed: bool,
}

impl Response {
    /// Creates an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Creates a `text/plain` response.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let mut response = Self::new(status);
        response.set_content_type(&MediaType::text_plain().with_param("charset", "utf-8"));
        response.set_body(body.into());
        response
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The `Content-Type`, if set and valid.
    pub fn content_type(&self) -> Option<MediaType> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| MediaType::parse(v).ok())
    }

    /// Returns true once the response has been handed to the transport.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Marks the response as flushed. Idempotent.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    fn writable(&self, what: &'static str) -> bool {
        if self.committed {
            warn!(what, status = %self.status, "Ignoring write to committed response");
        }
        !self.committed
    }

    /// Sets the status.
    pub fn set_status(&mut self, status: StatusCode) {
        if self.writable("status") {
            self.status = status;
        }
    }

    /// Replaces a header.
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.writable("header") {
            self.headers.insert(name, value);
        }
    }

    /// Sets the `Content-Type` header.
    pub fn set_content_type(&mut self, media_type: &MediaType) {
        if let Ok(value) = HeaderValue::from_str(&media_type.to_string()) {
            self.insert_header(CONTENT_TYPE, value);
        }
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        if self.writable("body") {
            self.body = body.into();
        }
    }

    /// Splits into status, headers and body.
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}
