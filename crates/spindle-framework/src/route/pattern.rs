//! Path patterns.
//!
//! Supported syntax, one element per segment:
//!
//! | Segment        | Matches                                            |
//! |----------------|----------------------------------------------------|
//! | `users`        | the literal text                                   |
//! | `{id}`         | any one segment, captured as `id`                  |
//! | `{id:\d+}`     | one segment matching the regex, captured as `id`   |
//! | `*`            | any one segment                                    |
//! | `**`           | the remaining segments, zero or more (last only)   |
//!
//! Matrix parameters (`/cars;color=red,blue/...`) are stripped from a segment
//! before it is compared and recorded under the segment's variable name, or
//! under the literal text for literal segments. Empty segments are ignored,
//! so `/a//b/` matches the same patterns as `/a/b`.

use std::borrow::Cow;
use std::fmt;

use regex::Regex;
use thiserror::Error;

use spindle_core::foundation::PathMatch;

/// Errors raised while compiling a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The pattern does not start with `/`.
    #[error("pattern '{pattern}' must start with '/'")]
    MissingLeadingSlash {
        /// The offending pattern.
        pattern: String,
    },

    /// A variable does not span its whole segment.
    #[error("variable in segment '{segment}' of '{pattern}' must span the whole segment")]
    PartialVariable {
        /// The offending pattern.
        pattern: String,
        /// The offending segment.
        segment: String,
    },

    /// A variable has no name.
    #[error("empty variable name in '{pattern}'")]
    EmptyVariable {
        /// The offending pattern.
        pattern: String,
    },

    /// Two variables share a name.
    #[error("duplicate variable '{name}' in '{pattern}'")]
    DuplicateVariable {
        /// The offending pattern.
        pattern: String,
        /// The repeated name.
        name: String,
    },

    /// `**` is followed by more segments.
    #[error("'**' must be the last segment of '{pattern}'")]
    MisplacedRemainder {
        /// The offending pattern.
        pattern: String,
    },

    /// A variable constraint is not a valid regex.
    #[error("invalid constraint for '{name}' in '{pattern}': {reason}")]
    InvalidConstraint {
        /// The offending pattern.
        pattern: String,
        /// The constrained variable.
        name: String,
        /// Regex compiler message.
        reason: String,
    },
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Variable { name: String, constraint: Option<Regex> },
    Wildcard,
    Remainder,
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compiles a pattern.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash {
                pattern: pattern.to_string(),
            });
        }

        let parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();

        for (position, part) in parts.iter().enumerate() {
            let segment = match *part {
                "*" => Segment::Wildcard,
                "**" => {
                    if position + 1 != parts.len() {
                        return Err(PatternError::MisplacedRemainder {
                            pattern: pattern.to_string(),
                        });
                    }
                    Segment::Remainder
                }
                part if part.starts_with('{') && part.ends_with('}') => {
                    let inner = &part[1..part.len() - 1];
                    let (name, constraint) = match inner.split_once(':') {
                        Some((name, re)) => (name.trim(), Some(re)),
                        None => (inner.trim(), None),
                    };
                    if name.is_empty() {
                        return Err(PatternError::EmptyVariable {
                            pattern: pattern.to_string(),
                        });
                    }
                    if names.contains(&name) {
                        return Err(PatternError::DuplicateVariable {
                            pattern: pattern.to_string(),
                            name: name.to_string(),
                        });
                    }
                    names.push(name);
                    let constraint = constraint
                        .map(|re| {
                            Regex::new(&format!("^(?:{re})$")).map_err(|err| {
                                PatternError::InvalidConstraint {
                                    pattern: pattern.to_string(),
                                    name: name.to_string(),
                                    reason: err.to_string(),
                                }
                            })
                        })
                        .transpose()?;
                    Segment::Variable {
                        name: name.to_string(),
                        constraint,
                    }
                }
                part if part.contains(['{', '}']) => {
                    return Err(PatternError::PartialVariable {
                        pattern: pattern.to_string(),
                        segment: part.to_string(),
                    });
                }
                part => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The source text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the captured variables, in pattern order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Matches a request path, returning the captured variables.
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut matched = PathMatch::new();
        let mut position = 0;

        for segment in &self.segments {
            let Some(part) = parts.get(position) else {
                return matches!(segment, Segment::Remainder).then_some(matched);
            };
            position += 1;

            let (value, matrix) = split_matrix(part);
            let value = decode_segment(value);
            let owner = match segment {
                Segment::Literal(literal) => {
                    if value != literal.as_str() {
                        return None;
                    }
                    literal.as_str()
                }
                Segment::Variable { name, constraint } => {
                    if let Some(re) = constraint
                        && !re.is_match(&value)
                    {
                        return None;
                    }
                    matched.push_variable(name.as_str(), value.into_owned());
                    name.as_str()
                }
                Segment::Wildcard => "*",
                Segment::Remainder => return Some(matched),
            };

            for (key, values) in matrix {
                for item in values.split(',').filter(|v| !v.is_empty()) {
                    matched.push_matrix(owner, decode_segment(key), decode_segment(item));
                }
            }
        }

        (position == parts.len()).then_some(matched)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Splits `value;k1=a,b;k2=c` into `value` and its matrix pairs.
fn split_matrix(segment: &str) -> (&str, Vec<(&str, &str)>) {
    let mut pieces = segment.split(';');
    let value = pieces.next().unwrap_or_default();
    let matrix = pieces
        .filter(|p| !p.is_empty())
        .map(|p| p.split_once('=').unwrap_or((p, "")))
        .collect();
    (value, matrix)
}

fn decode_segment(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_variables() {
        let pattern = PathPattern::parse("/users/{id}/posts/{post}").unwrap();
        let matched = pattern.matches("/users/42/posts/hello%20world").unwrap();
        assert_eq!(matched.variable("id"), Some("42"));
        assert_eq!(matched.variable("post"), Some("hello world"));
        assert_eq!(pattern.variables().collect::<Vec<_>>(), ["id", "post"]);

        assert!(pattern.matches("/users/42/posts").is_none());
        assert!(pattern.matches("/users/42/comments/1").is_none());
        assert!(pattern.matches("/users/42/posts/1/extra").is_none());
    }

    #[test]
    fn test_constrained_variable() {
        let pattern = PathPattern::parse("/items/{id:\\d+}").unwrap();
        assert!(pattern.matches("/items/17").is_some());
        assert!(pattern.matches("/items/abc").is_none());
        // Anchored: a partial match is not enough.
        assert!(pattern.matches("/items/17a").is_none());
    }

    #[test]
    fn test_wildcards() {
        let one = PathPattern::parse("/files/*/meta").unwrap();
        assert!(one.matches("/files/a/meta").is_some());
        assert!(one.matches("/files/a/b/meta").is_none());

        let rest = PathPattern::parse("/static/**").unwrap();
        assert!(rest.matches("/static").is_some());
        assert!(rest.matches("/static/css/site.css").is_some());
        assert!(rest.matches("/other/css").is_none());
    }

    #[test]
    fn test_empty_segments_are_ignored() {
        let pattern = PathPattern::parse("/a/b").unwrap();
        assert!(pattern.matches("//a///b/").is_some());
        assert!(PathPattern::parse("/").unwrap().matches("").is_some());
    }

    #[test]
    fn test_matrix_parameters() {
        let pattern = PathPattern::parse("/cars/{model}/wheels").unwrap();
        let matched = pattern
            .matches("/cars;year=2024/golf;color=red,blue;used/wheels")
            .unwrap();
        assert_eq!(matched.variable("model"), Some("golf"));
        assert_eq!(
            matched.matrix_values("model", "color").collect::<Vec<_>>(),
            ["red", "blue"]
        );
        assert_eq!(matched.matrix_variable("cars", "year"), Some("2024"));
        assert_eq!(matched.matrix_variable("model", "used"), None);
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            PathPattern::parse("users"),
            Err(PatternError::MissingLeadingSlash { .. })
        ));
        assert!(matches!(
            PathPattern::parse("/a/**/b"),
            Err(PatternError::MisplacedRemainder { .. })
        ));
        assert!(matches!(
            PathPattern::parse("/a/{id}/{id}"),
            Err(PatternError::DuplicateVariable { .. })
        ));
        assert!(matches!(
            PathPattern::parse("/a/x{id}"),
            Err(PatternError::PartialVariable { .. })
        ));
        assert!(matches!(
            PathPattern::parse("/a/{}"),
            Err(PatternError::EmptyVariable { .. })
        ));
        assert!(matches!(
            PathPattern::parse("/a/{id:(}"),
            Err(PatternError::InvalidConstraint { .. })
        ));
    }
}
