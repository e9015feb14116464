//! Type-erased resolved values and the [`HandledValue`] tri-state.

use std::any::{Any, type_name};
use std::fmt;

/// A resolved argument or handler return value.
///
/// A `Value` is either null or holds exactly one value of some `'static`
/// type. Null is a legitimate resolution result and is distinct from
/// [`HandledValue::NotHandled`].
#[derive(Default)]
pub struct Value {
    inner: Option<(Box<dyn Any + Send>, &'static str)>,
}

impl Value {
    /// The null value.
    pub const fn null() -> Self {
        Self { inner: None }
    }

    /// Wraps a value.
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            inner: Some((Box::new(value), type_name::<T>())),
        }
    }

    /// Wraps an already boxed value. `type_name` is only used in
    /// diagnostics.
    pub fn from_boxed(value: Box<dyn Any + Send>, type_name: &'static str) -> Self {
        Self {
            inner: Some((value, type_name)),
        }
    }

    /// Wraps `Some(value)` or produces null.
    pub fn from_option<T: Any + Send>(value: Option<T>) -> Self {
        value.map_or_else(Self::null, Self::new)
    }

    /// Returns true if the value is null.
    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns true if the value holds a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.as_ref().is_some_and(|(v, _)| v.is::<T>())
    }

    /// Name of the held type, if any.
    pub fn type_name(&self) -> Option<&'static str> {
        self.inner.as_ref().map(|(_, name)| *name)
    }

    /// Borrows the held value as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_ref().and_then(|(v, _)| v.downcast_ref::<T>())
    }

    /// Takes the held value as `T`.
    ///
    /// Null yields `Ok(None)`. A value of another type is handed back
    /// unchanged in `Err`.
    pub fn downcast<T: Any>(self) -> Result<Option<T>, Self> {
        match self.inner {
            None => Ok(None),
            Some((boxed, name)) => match boxed.downcast::<T>() {
                Ok(value) => Ok(Some(*value)),
                Err(boxed) => Err(Self {
                    inner: Some((boxed, name)),
                }),
            },
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_name() {
            Some(name) => write!(f, "Value({name})"),
            None => f.write_str("Value(null)"),
        }
    }
}

/// Result of an entity resolver attempt.
///
/// `NotHandled` means "try the next candidate" and is not an error.
/// `Handled` carries the result, which may itself be a null [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum HandledValue<T> {
    /// The resolver declined; the next candidate should be tried.
    NotHandled,
    /// The resolver produced a result.
    Handled(T),
}

impl<T> HandledValue<T> {
    /// Declines the current attempt.
    pub const fn failed() -> Self {
        Self::NotHandled
    }

    /// Completes the current attempt with `value`.
    pub const fn succeed(value: T) -> Self {
        Self::Handled(value)
    }

    /// Returns true if a result was produced.
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }

    /// Converts into an `Option`, dropping the distinction from null values.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Handled(value) => Some(value),
            Self::NotHandled => None,
        }
    }

    /// Maps the handled value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> HandledValue<U> {
        match self {
            Self::Handled(value) => HandledValue::Handled(f(value)),
            Self::NotHandled => HandledValue::NotHandled,
        }
    }
}

impl<T> From<Option<T>> for HandledValue<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NotHandled, Self::Handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_roundtrip_and_mismatch() {
        let value = Value::new(42_i64);
        assert!(value.is::<i64>());
        assert_eq!(value.type_name(), Some("i64"));

        let value = value.downcast::<String>().unwrap_err();
        assert_eq!(value.downcast::<i64>().unwrap(), Some(42));
    }

    #[test]
    fn test_null_is_distinct_from_not_handled() {
        let handled: HandledValue<Value> = HandledValue::succeed(Value::null());
        assert!(handled.is_handled());
        assert!(handled.into_option().unwrap().is_null());

        let declined: HandledValue<Value> = HandledValue::failed();
        assert!(!declined.is_handled());
    }

    #[test]
    fn test_from_option() {
        assert!(Value::from_option::<u8>(None).is_null());
        assert_eq!(Value::from_option(Some(3_u8)).downcast_ref::<u8>(), Some(&3));
    }
}
