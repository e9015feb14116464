//! Immutable descriptors of endpoints and their arguments.
//!
//! Descriptors are built once at deployment and drive resolver selection:
//! every factory predicate looks at a [`Param`] or [`HandlerMethod`], never
//! at a live request.

use std::any::{Any, TypeId, type_name};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

/// Identity and name of a Rust type.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    /// Describes `T`.
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The type id.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if this describes `T`.
    pub fn is<T: Any + ?Sized>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl std::hash::Hash for TypeInfo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Free-form descriptor attributes, the stand-in for annotations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata(BTreeMap<String, JsonValue>);

impl Metadata {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns an attribute.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// Returns an attribute as a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(JsonValue::as_str)
    }

    /// Returns true if the attribute is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Where an argument's raw value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSource {
    /// A named path variable.
    Path(String),
    /// A matrix parameter attached to the segment of a path variable.
    Matrix {
        /// The path variable owning the segment.
        path_var: String,
        /// The matrix parameter name.
        name: String,
    },
    /// A query parameter.
    Query(String),
    /// A request header.
    Header(String),
    /// The request body, read by the request-entity resolvers.
    Body,
    /// A framework object resolved by the context resolvers.
    Context,
    /// Left to a user-registered parameter resolver; the string is a tag
    /// the resolver's predicate can match on.
    Custom(String),
}

impl ParamSource {
    /// The key the source looks up, if it has one.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Path(name) | Self::Query(name) | Self::Header(name) => Some(name),
            Self::Matrix { name, .. } => Some(name),
            Self::Custom(tag) => Some(tag),
            Self::Body | Self::Context => None,
        }
    }
}

/// Everything about an argument except its position and declared type,
/// which come from the handler signature.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    source: ParamSource,
    required: bool,
    default_value: Option<String>,
    generic: Option<TypeInfo>,
    metadata: Metadata,
}

impl ParamSpec {
    fn with_source(source: ParamSource) -> Self {
        Self {
            source,
            required: true,
            default_value: None,
            generic: None,
            metadata: Metadata::new(),
        }
    }

    /// A path variable.
    pub fn path(name: impl Into<String>) -> Self {
        Self::with_source(ParamSource::Path(name.into()))
    }

    /// A matrix parameter on the segment bound to `path_var`.
    pub fn matrix(path_var: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_source(ParamSource::Matrix {
            path_var: path_var.into(),
            name: name.into(),
        })
    }

    /// A query parameter.
    pub fn query(name: impl Into<String>) -> Self {
        Self::with_source(ParamSource::Query(name.into()))
    }

    /// A request header.
    pub fn header(name: impl Into<String>) -> Self {
        Self::with_source(ParamSource::Header(name.into()))
    }

    /// The request body.
    pub fn body() -> Self {
        Self::with_source(ParamSource::Body)
    }

    /// A framework object.
    pub fn context() -> Self {
        Self::with_source(ParamSource::Context)
    }

    /// A custom source handled by a user resolver.
    pub fn custom(tag: impl Into<String>) -> Self {
        Self::with_source(ParamSource::Custom(tag.into()))
    }

    /// Allows the argument to be absent.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Value used when the raw value is absent.
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Records the element type of a container argument.
    pub fn generic<T: Any>(mut self) -> Self {
        self.generic = Some(TypeInfo::of::<T>());
        self
    }

    /// Sets a metadata attribute.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// The source.
    pub fn source(&self) -> &ParamSource {
        &self.source
    }

    /// Completes the descriptor.
    pub fn into_param(self, index: usize, declared: TypeInfo) -> Param {
        let name = self
            .source
            .key()
            .map_or_else(|| format!("arg{index}"), str::to_string);
        Param {
            index,
            name,
            declared,
            generic: self.generic,
            source: self.source,
            required: self.required,
            default_value: self.default_value,
            metadata: self.metadata,
        }
    }
}

/// Immutable descriptor of one handler argument.
#[derive(Debug, Clone)]
pub struct Param {
    index: usize,
    name: String,
    declared: TypeInfo,
    generic: Option<TypeInfo>,
    source: ParamSource,
    required: bool,
    default_value: Option<String>,
    metadata: Metadata,
}

impl Param {
    /// Creates a required argument descriptor.
    pub fn new(index: usize, declared: TypeInfo, source: ParamSource) -> Self {
        ParamSpec::with_source(source).into_param(index, declared)
    }

    /// Position in the handler signature.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Name used in diagnostics and lookups.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared argument type.
    pub fn declared(&self) -> TypeInfo {
        self.declared
    }

    /// The element type, if recorded.
    pub fn generic(&self) -> Option<TypeInfo> {
        self.generic
    }

    /// Where the raw value comes from.
    pub fn source(&self) -> &ParamSource {
        &self.source
    }

    /// Whether a missing value is an error.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The fallback raw value.
    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Descriptor attributes.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

/// Immutable descriptor of an endpoint.
#[derive(Debug, Clone)]
pub struct HandlerMethod {
    name: String,
    params: Vec<Arc<Param>>,
    return_type: TypeInfo,
    metadata: Metadata,
}

impl HandlerMethod {
    /// Creates a descriptor.
    pub fn new(
        name: impl Into<String>,
        params: Vec<Param>,
        return_type: TypeInfo,
        metadata: Metadata,
    ) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().map(Arc::new).collect(),
            return_type,
            metadata,
        }
    }

    /// The endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Argument descriptors in signature order.
    pub fn params(&self) -> &[Arc<Param>] {
        &self.params
    }

    /// The handler's success type.
    pub fn return_type(&self) -> TypeInfo {
        self.return_type
    }

    /// Descriptor attributes.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_info_identity() {
        assert_eq!(TypeInfo::of::<String>(), TypeInfo::of::<String>());
        assert_ne!(TypeInfo::of::<String>(), TypeInfo::of::<&'static str>());
        assert!(TypeInfo::of::<Option<u32>>().is::<Option<u32>>());
    }

    #[test]
    fn test_spec_into_param() {
        let param = ParamSpec::query("page")
            .optional()
            .default_value("1")
            .meta("doc", "page number")
            .into_param(2, TypeInfo::of::<u32>());

        assert_eq!(param.index(), 2);
        assert_eq!(param.name(), "page");
        assert!(!param.is_required());
        assert_eq!(param.default_value(), Some("1"));
        assert_eq!(param.metadata().get_str("doc"), Some("page number"));

        let body = ParamSpec::body().into_param(0, TypeInfo::of::<String>());
        assert_eq!(body.name(), "arg0");
    }
}
