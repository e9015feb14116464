//! Media types and `Accept` header negotiation.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error returned when a media type string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid media type '{input}': {reason}")]
pub struct MediaTypeError {
    input: String,
    reason: &'static str,
}

/// A parsed `type/subtype; key=value` media type.
///
/// Type, subtype and parameter names are stored lower-cased. Wildcards are
/// represented by `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    ty: String,
    subtype: String,
    params: Vec<(String, String)>,
}

impl MediaType {
    /// Creates a media type without parameters.
    pub fn new(ty: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            ty: ty.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            params: Vec::new(),
        }
    }

    /// `*/*`
    pub fn all() -> Self {
        Self::new("*", "*")
    }

    /// `text/plain`
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// `application/json`
    pub fn application_json() -> Self {
        Self::new("application", "json")
    }

    /// `application/octet-stream`
    pub fn octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// Returns a copy with the given parameter set.
    pub fn with_param(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Parses a single media type.
    pub fn parse(input: &str) -> Result<Self, MediaTypeError> {
        let error = |reason| MediaTypeError {
            input: input.to_string(),
            reason,
        };

        let mut parts = input.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (ty, subtype) = essence.split_once('/').ok_or_else(|| error("missing '/'"))?;
        let (ty, subtype) = (ty.trim(), subtype.trim());
        if ty.is_empty() || subtype.is_empty() {
            return Err(error("empty type or subtype"));
        }
        if ty == "*" && subtype != "*" {
            return Err(error("wildcard type with concrete subtype"));
        }

        let mut media = Self::new(ty, subtype);
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (name, value) = param
                .split_once('=')
                .ok_or_else(|| error("parameter without '='"))?;
            media = media.with_param(name.trim(), value.trim().trim_matches('"'));
        }
        Ok(media)
    }

    /// Parses a comma separated list such as an `Accept` header, ordered by
    /// descending quality. Entries that fail to parse or carry `q=0` are
    /// dropped; equal qualities keep their header order.
    pub fn parse_list(header: &str) -> Vec<Self> {
        let mut list: Vec<Self> = header
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .filter_map(|s| Self::parse(s).ok())
            .filter(|m| m.quality() > 0.0)
            .collect();
        list.sort_by(|a, b| b.quality().partial_cmp(&a.quality()).unwrap_or(Ordering::Equal));
        list
    }

    /// The top-level type.
    pub fn ty(&self) -> &str {
        &self.ty
    }

    /// The subtype.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Returns a parameter value.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `charset` parameter, if present.
    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    /// The `q` parameter, defaulting to 1.0.
    pub fn quality(&self) -> f32 {
        self.param("q")
            .and_then(|q| q.parse::<f32>().ok())
            .map(|q| q.clamp(0.0, 1.0))
            .unwrap_or(1.0)
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.ty, self.subtype)
    }

    /// Returns true for `*/*` and `type/*`.
    pub fn is_wildcard(&self) -> bool {
        self.ty == "*" || self.subtype == "*"
    }

    /// Returns true if this type covers `other`.
    ///
    /// `*/*` includes everything, `text/*` includes `text/plain`, and a
    /// concrete type only includes itself. Parameters are ignored.
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.ty == "*" {
            return true;
        }
        if self.ty != other.ty {
            return false;
        }
        self.subtype == "*" || self.subtype == other.subtype
    }

    /// Returns true if either type includes the other.
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        self.includes(other) || other.includes(self)
    }

    /// The more concrete of two compatible types.
    pub fn most_specific<'a>(&'a self, other: &'a MediaType) -> &'a MediaType {
        if self.is_wildcard() && !other.is_wildcard() {
            other
        } else if self.ty == "*" && other.ty != "*" {
            other
        } else {
            self
        }
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ty, self.subtype)?;
        for (name, value) in &self.params {
            write!(f, "; {name}={value}")?;
        }
        Ok(())
    }
}

/// Joins media types for diagnostics.
pub fn join_media_types(types: &[MediaType]) -> String {
    types
        .iter()
        .map(MediaType::essence)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_params() {
        let media = MediaType::parse("Text/HTML; charset=\"UTF-8\"").unwrap();
        assert_eq!(media.ty(), "text");
        assert_eq!(media.subtype(), "html");
        assert_eq!(media.charset(), Some("UTF-8"));
        assert_eq!(media.essence(), "text/html");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(MediaType::parse("json").is_err());
        assert!(MediaType::parse("*/json").is_err());
        assert!(MediaType::parse("text/").is_err());
    }

    #[test]
    fn test_includes() {
        let text = MediaType::text_plain();
        assert!(MediaType::all().includes(&text));
        assert!(MediaType::new("text", "*").includes(&text));
        assert!(!text.includes(&MediaType::new("text", "*")));
        assert!(text.is_compatible_with(&MediaType::new("text", "*")));
        assert!(!text.is_compatible_with(&MediaType::application_json()));
    }

    #[test]
    fn test_accept_ordering() {
        let list = MediaType::parse_list("text/*;q=0.5, application/json, image/png;q=0, */*;q=0.1");
        let names: Vec<_> = list.iter().map(MediaType::essence).collect();
        assert_eq!(names, ["application/json", "text/*", "*/*"]);
    }
}
