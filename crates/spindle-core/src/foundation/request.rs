//! The immutable inbound request.

use std::fmt;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};

use super::media::MediaType;

/// Method and normalized path: the part of a request route selection keys on
/// before header and media type predicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    method: Method,
    path: String,
}

impl RequestSignature {
    /// Creates a signature, collapsing empty path segments.
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: normalize_path(path),
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The normalized path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Collapses repeated and trailing slashes: `//a/b/` becomes `/a/b`.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// An inbound request as handed over by the transport.
///
/// Requests are immutable once built and shared between the dispatcher and
/// the worker that serves them.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    /// Creates a request without headers or body. `target` may carry a query
    /// string.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Returns a builder.
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// All headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the first value of a header as a string.
    ///
    /// Header names are case-insensitive; values that are not visible ASCII
    /// are ignored.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decoded query parameters in order of appearance.
    pub fn query_params(&self) -> Vec<(String, String)> {
        self.query.as_deref().map(parse_query).unwrap_or_default()
    }

    /// The first decoded value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_params()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// The parsed `Content-Type`, if present and valid.
    pub fn content_type(&self) -> Option<MediaType> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| MediaType::parse(v).ok())
    }

    /// The parsed `Accept` list ordered by quality; empty if absent.
    pub fn accept(&self) -> Vec<MediaType> {
        let joined = self
            .headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");
        MediaType::parse_list(&joined)
    }

    /// The method and normalized path.
    pub fn signature(&self) -> RequestSignature {
        RequestSignature::new(self.method.clone(), &self.path)
    }
}

/// Builder for [`Request`].
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Method,
    target: String,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl RequestBuilder {
    /// Sets the method (default `GET`).
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the path and optional query string.
    pub fn uri(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Builds the request, validating header names and values.
    pub fn build(self) -> Result<Request, http::Error> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            let value = HeaderValue::from_str(&value)?;
            headers.append(name, value);
        }

        let target = if self.target.is_empty() {
            "/"
        } else {
            self.target.as_str()
        };
        let (path, query) = split_target(target);

        Ok(Request {
            method: self.method,
            path,
            query,
            headers,
            body: self.body,
        })
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

/// Percent-decodes a query component, treating `+` as a space. Invalid
/// UTF-8 sequences are kept verbatim.
pub fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_splits_query() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/users/7?expand=true&name=J%C3%BCrgen+K")
            .header("Content-Type", "text/plain; charset=utf-8")
            .body("hello")
            .build()
            .unwrap();

        assert_eq!(request.path(), "/users/7");
        assert_eq!(request.query_param("expand").as_deref(), Some("true"));
        assert_eq!(request.query_param("name").as_deref(), Some("Jürgen K"));
        assert_eq!(request.query_param("missing"), None);
        assert_eq!(request.content_type().unwrap().essence(), "text/plain");
        assert_eq!(request.header("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let result = Request::builder().header("bad header", "x").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_signature_normalizes_path() {
        let request = Request::new(Method::GET, "//users//7/?x=1");
        assert_eq!(request.signature().path(), "/users/7");
        assert_eq!(Request::new(Method::GET, "").signature().path(), "/");
    }

    #[test]
    fn test_accept_merges_headers() {
        let request = Request::builder()
            .header("Accept", "text/plain;q=0.2")
            .header("Accept", "application/json")
            .build()
            .unwrap();
        let accept: Vec<_> = request.accept().iter().map(MediaType::essence).collect();
        assert_eq!(accept, ["application/json", "text/plain"]);
    }
}
