//! String converters for primitives and `Option`s of primitives.

use std::any::{Any, TypeId};
use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use spindle_core::error::{BoxError, ResolveError};
use spindle_core::foundation::{FALLBACK_ORDER, Param, Value};

use crate::resolver::{Factory, ResolverRegistry, StringConverter};

/// Converts to `T` through [`FromStr`].
///
/// An absent raw value falls back to the parameter's default; if there is
/// none, a required parameter fails with
/// [`ResolveError::MissingParameter`] and an optional one resolves to null.
pub struct FromStrConverter<T>(PhantomData<fn() -> T>);

impl<T> Default for FromStrConverter<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Factory<Param, StringConverter> for FromStrConverter<T>
where
    T: FromStr + Any + Send,
    T::Err: Display,
{
    fn supports(&self, param: &Param) -> bool {
        param.declared().is::<T>()
    }

    fn create(
        &self,
        param: &Param,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<StringConverter>, BoxError> {
        let name = param.name().to_string();
        let required = param.is_required();
        let default = param.default_value().map(str::to_string);
        let resolver = move |raw: &mut Option<String>| -> Result<Value, BoxError> {
            match raw.take().or_else(|| default.clone()) {
                Some(raw) => parse::<T>(&name, &raw).map(Value::new),
                None if required => Err(ResolveError::missing(name.as_str()).into()),
                None => Ok(Value::null()),
            }
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }
}

/// Converts to `Option<T>`: an absent value (and no default) is `None`,
/// never an error.
pub struct OptionalConverter<T>(PhantomData<fn() -> T>);

impl<T> Default for OptionalConverter<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Factory<Param, StringConverter> for OptionalConverter<T>
where
    T: FromStr + Any + Send,
    T::Err: Display,
{
    fn supports(&self, param: &Param) -> bool {
        param.declared().is::<Option<T>>()
    }

    fn create(
        &self,
        param: &Param,
        _registry: &ResolverRegistry,
    ) -> Result<Arc<StringConverter>, BoxError> {
        let name = param.name().to_string();
        let default = param.default_value().map(str::to_string);
        let resolver = move |raw: &mut Option<String>| -> Result<Value, BoxError> {
            let parsed = raw
                .take()
                .or_else(|| default.clone())
                .map(|raw| parse::<T>(&name, &raw))
                .transpose()?;
            Ok(Value::new(parsed))
        };
        Ok(Arc::new(resolver))
    }

    fn order(&self) -> i32 {
        FALLBACK_ORDER
    }
}

fn parse<T>(name: &str, raw: &str) -> Result<T, BoxError>
where
    T: FromStr + Any,
    T::Err: Display,
{
    // Strings are taken verbatim, everything else ignores surrounding blanks.
    let raw = if TypeId::of::<T>() == TypeId::of::<String>() {
        raw
    } else {
        raw.trim()
    };
    raw.parse::<T>()
        .map_err(|err| ResolveError::conversion(name, err).into())
}

#[cfg(test)]
mod tests {
    use spindle_core::foundation::{ParamSpec, TypeInfo};

    use super::*;

    fn convert<T: Any>(spec: ParamSpec, raw: Option<&str>) -> Result<Value, BoxError> {
        let registry = ResolverRegistry::with_defaults();
        let param = spec.into_param(0, TypeInfo::of::<T>());
        let converter = registry.bind_converter(&param).unwrap();
        converter.resolve(&mut raw.map(str::to_string))
    }

    #[test]
    fn test_primitives_trim_but_strings_do_not() {
        let n = convert::<i16>(ParamSpec::query("n"), Some(" -12 ")).unwrap();
        assert_eq!(n.downcast_ref::<i16>(), Some(&-12));
        let s = convert::<String>(ParamSpec::query("s"), Some(" padded ")).unwrap();
        assert_eq!(s.downcast_ref::<String>().map(String::as_str), Some(" padded "));
        let b = convert::<bool>(ParamSpec::query("b"), Some("true")).unwrap();
        assert_eq!(b.downcast_ref::<bool>(), Some(&true));
        let c = convert::<char>(ParamSpec::query("c"), Some("x")).unwrap();
        assert_eq!(c.downcast_ref::<char>(), Some(&'x'));
        let f = convert::<f64>(ParamSpec::query("f"), Some("2.5")).unwrap();
        assert_eq!(f.downcast_ref::<f64>(), Some(&2.5));
    }

    #[test]
    fn test_out_of_range_is_a_conversion_error() {
        let err = convert::<u8>(ParamSpec::query("n"), Some("300")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::Conversion { name, .. }) if name == "n"
        ));
    }

    #[test]
    fn test_optional_converter() {
        let some = convert::<Option<u32>>(ParamSpec::query("n"), Some("4")).unwrap();
        assert_eq!(some.downcast_ref::<Option<u32>>(), Some(&Some(4)));
        let defaulted =
            convert::<Option<u32>>(ParamSpec::query("n").default_value("9"), None).unwrap();
        assert_eq!(defaulted.downcast_ref::<Option<u32>>(), Some(&Some(9)));
        let err = convert::<Option<u32>>(ParamSpec::query("n"), Some("x")).unwrap_err();
        assert!(err.downcast_ref::<ResolveError>().is_some());
    }
}
