//! Header and media type predicates of a route.

use std::fmt;
use std::str::FromStr;

use http::{HeaderMap, HeaderName};
use thiserror::Error;

use spindle_core::foundation::{MediaType, Request};

/// A header predicate that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid header condition '{input}': {reason}")]
pub struct ConditionError {
    input: String,
    reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeaderCheck {
    Present,
    Absent,
    Equals(String),
}

/// One header predicate: `Name` (present), `!Name` (absent) or
/// `Name=value` (equal, case-sensitive value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCondition {
    name: HeaderName,
    check: HeaderCheck,
}

impl HeaderCondition {
    /// Parses a predicate.
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let error = |reason| ConditionError {
            input: input.to_string(),
            reason,
        };
        let input = input.trim();
        let (name, check) = if let Some(name) = input.strip_prefix('!') {
            (name, HeaderCheck::Absent)
        } else if let Some((name, value)) = input.split_once('=') {
            (name, HeaderCheck::Equals(value.trim().to_string()))
        } else {
            (input, HeaderCheck::Present)
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(error("missing header name"));
        }
        let name = HeaderName::from_str(name).map_err(|_| error("invalid header name"))?;
        Ok(Self { name, check })
    }

    /// Evaluates the predicate.
    pub fn matches(&self, headers: &HeaderMap) -> bool {
        match &self.check {
            HeaderCheck::Present => headers.contains_key(&self.name),
            HeaderCheck::Absent => !headers.contains_key(&self.name),
            HeaderCheck::Equals(expected) => headers
                .get_all(&self.name)
                .iter()
                .any(|v| v.to_str().is_ok_and(|v| v.trim() == expected)),
        }
    }
}

impl fmt::Display for HeaderCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.check {
            HeaderCheck::Present => write!(f, "{}", self.name),
            HeaderCheck::Absent => write!(f, "!{}", self.name),
            HeaderCheck::Equals(value) => write!(f, "{}={value}", self.name),
        }
    }
}

/// Media types a route reads. Empty accepts any request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consumes(Vec<MediaType>);

impl Consumes {
    /// Creates the predicate.
    pub fn new(types: Vec<MediaType>) -> Self {
        Self(types)
    }

    /// The consumable types.
    pub fn types(&self) -> &[MediaType] {
        &self.0
    }

    /// Returns true if the request's content type is consumable. A request
    /// without a content type is treated as `application/octet-stream`.
    pub fn matches(&self, request: &Request) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let content_type = request.content_type().unwrap_or_else(MediaType::octet_stream);
        self.0.iter().any(|consumable| consumable.includes(&content_type))
    }
}

/// Media types a route writes. Empty produces whatever the client accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Produces(Vec<MediaType>);

impl Produces {
    /// Creates the predicate.
    pub fn new(types: Vec<MediaType>) -> Self {
        Self(types)
    }

    /// The producible types.
    pub fn types(&self) -> &[MediaType] {
        &self.0
    }

    /// Negotiates against an `Accept` list (best first, empty meaning any).
    ///
    /// Returns the acceptable types this route can produce, most preferred
    /// first and as concrete as possible, or `None` if there is no overlap.
    pub fn negotiate(&self, accept: &[MediaType]) -> Option<Vec<MediaType>> {
        let any = [MediaType::all()];
        let accept = if accept.is_empty() { &any[..] } else { accept };
        if self.0.is_empty() {
            return Some(accept.to_vec());
        }

        let mut acceptable: Vec<MediaType> = Vec::new();
        for accepted in accept {
            for producible in &self.0 {
                if accepted.is_compatible_with(producible) {
                    let concrete = accepted.most_specific(producible).clone();
                    if !acceptable.contains(&concrete) {
                        acceptable.push(concrete);
                    }
                }
            }
        }
        (!acceptable.is_empty()).then_some(acceptable)
    }
}
