//! Handler functions.
//!
//! Any async function of up to eight arguments returning `Result<R, E>` is a
//! [`Handler`]. Arguments arrive as resolved [`Value`]s and are unpacked
//! positionally; the success value is boxed back into a [`Value`] for the
//! response entity resolvers.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn greet(name: String, times: Option<u8>) -> Result<String, HttpError> {
//!     Ok(name.repeat(times.unwrap_or(1) as usize))
//! }
//!
//! let handler = ErasedHandler::from_fn(greet);
//! assert_eq!(handler.arg_types().len(), 2);
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use spindle_core::error::{BoxError, ResolveError};
use spindle_core::foundation::{TypeInfo, Value};

/// The future a handler call produces.
pub type HandlerFuture = BoxFuture<'static, Result<Value, BoxError>>;

/// A type-erased handler.
///
/// Unpacking arguments happens before the future is created, so a type or
/// null mismatch is reported as a [`ResolveError`] rather than a handler
/// failure.
pub type BoxedHandler = Arc<dyn Fn(Args) -> Result<HandlerFuture, ResolveError> + Send + Sync>;

// ============================================================================
// Args
// ============================================================================

/// Resolved arguments, consumed left to right.
#[derive(Debug)]
pub struct Args {
    values: std::vec::IntoIter<Value>,
    index: usize,
}

impl Args {
    /// Wraps resolved values in argument order.
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into_iter(),
            index: 0,
        }
    }

    /// Number of arguments not yet taken.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if every argument was taken.
    pub fn is_empty(&self) -> bool {
        self.values.len() == 0
    }

    /// Takes the next argument as `T`.
    ///
    /// Asking for [`Value`] yields the raw value, null included. Otherwise a
    /// null value is [`ResolveError::NullArgument`] and a value of another
    /// type is [`ResolveError::ArgumentType`].
    pub fn take_next<T: Any>(&mut self) -> Result<T, ResolveError> {
        let index = self.index;
        self.index += 1;
        let value = self.values.next().unwrap_or_default();

        if TypeId::of::<T>() == TypeId::of::<Value>() {
            let raw: Box<dyn Any> = Box::new(value);
            return raw.downcast::<T>().map(|raw| *raw).map_err(|_| {
                ResolveError::ArgumentType {
                    index,
                    expected: type_name::<T>(),
                    actual: type_name::<Value>(),
                }
            });
        }

        let actual = value.type_name().unwrap_or("null");
        match value.downcast::<T>() {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(ResolveError::NullArgument { index }),
            Err(_) => Err(ResolveError::ArgumentType {
                index,
                expected: type_name::<T>(),
                actual,
            }),
        }
    }
}

// ============================================================================
// Handler trait
// ============================================================================

/// A function usable as an endpoint.
///
/// Implemented for async functions and closures of zero to eight arguments
/// whose future resolves to `Result<R, E>` with `E: Into<BoxError>`. `T` is
/// the argument tuple and only serves to keep the implementations apart.
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Types of the arguments, in order.
    fn arg_types() -> Vec<TypeInfo>;

    /// Type of the success value.
    fn return_type() -> TypeInfo;

    /// Unpacks the arguments and starts the call.
    fn call(self, args: Args) -> Result<HandlerFuture, ResolveError>;
}

macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, R, E, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Result<R, E>> + Send + 'static,
            R: Any + Send,
            E: Into<BoxError> + 'static,
            $( $ty: Any + Send, )*
        {
            fn arg_types() -> Vec<TypeInfo> {
                vec![$(TypeInfo::of::<$ty>(),)*]
            }

            fn return_type() -> TypeInfo {
                TypeInfo::of::<R>()
            }

            fn call(self, mut args: Args) -> Result<HandlerFuture, ResolveError> {
                $(
                    let $ty = args.take_next::<$ty>()?;
                )*
                let fut = (self)($($ty,)*);
                Ok(async move { fut.await.map(into_value).map_err(Into::into) }.boxed())
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);

/// Boxes a success value; a handler returning [`Value`] passes it through.
fn into_value<R: Any + Send>(value: R) -> Value {
    let boxed: Box<dyn Any + Send> = Box::new(value);
    match boxed.downcast::<Value>() {
        Ok(value) => *value,
        Err(boxed) => Value::from_boxed(boxed, type_name::<R>()),
    }
}

/// Converts a handler function into a boxed handler.
pub fn into_handler<F, T>(f: F) -> BoxedHandler
where
    F: Handler<T>,
    T: 'static,
{
    Arc::new(move |args| f.clone().call(args))
}

// ============================================================================
// ErasedHandler
// ============================================================================

/// A boxed handler together with its signature.
#[derive(Clone)]
pub struct ErasedHandler {
    handler: BoxedHandler,
    arg_types: Vec<TypeInfo>,
    return_type: TypeInfo,
}

impl ErasedHandler {
    /// Wraps a typed handler; the signature comes from the function type.
    pub fn from_fn<F, T>(f: F) -> Self
    where
        F: Handler<T>,
        T: 'static,
    {
        Self {
            handler: into_handler(f),
            arg_types: F::arg_types(),
            return_type: F::return_type(),
        }
    }

    /// Wraps an already erased handler with an explicit signature.
    pub fn new(arg_types: Vec<TypeInfo>, return_type: TypeInfo, handler: BoxedHandler) -> Self {
        Self {
            handler,
            arg_types,
            return_type,
        }
    }

    /// Argument types in order.
    pub fn arg_types(&self) -> &[TypeInfo] {
        &self.arg_types
    }

    /// Success value type.
    pub fn return_type(&self) -> TypeInfo {
        self.return_type
    }

    /// Starts a call.
    pub fn call(&self, args: Args) -> Result<HandlerFuture, ResolveError> {
        (self.handler)(args)
    }
}

impl fmt::Debug for ErasedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedHandler")
            .field("arg_types", &self.arg_types)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}
