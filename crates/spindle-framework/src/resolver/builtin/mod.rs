//! Built-in factories.
//!
//! Everything here is registered at
//! [`FALLBACK_ORDER`](spindle_core::foundation::FALLBACK_ORDER), so user
//! factories at the default order are consulted first.

mod context;
mod converter;
mod entity;
mod param;

pub use context::ContextValue;
pub use converter::{FromStrConverter, OptionalConverter};
pub use entity::{
    BytesReader, BytesWriter, ResponseWriter, StatusWriter, TextReader, TextWriter, UnitWriter,
};
pub use param::{BodyParam, NamedValueParam};

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};

use spindle_core::foundation::{PathMatch, Request};

use super::ResolverRegistryBuilder;

macro_rules! register_converters {
    ($builder:expr; $($ty:ty),+ $(,)?) => {{
        let mut builder = $builder;
        $(
            builder = builder
                .converter(FromStrConverter::<$ty>::default())
                .converter(OptionalConverter::<$ty>::default());
        )+
        builder
    }};
}

pub(crate) fn register(builder: ResolverRegistryBuilder) -> ResolverRegistryBuilder {
    let builder = register_converters!(
        builder;
        String, bool, char,
        i8, i16, i32, i64, i128, isize,
        u8, u16, u32, u64, u128, usize,
        f32, f64,
    );
    builder
        .param(NamedValueParam)
        .param(BodyParam)
        .context(ContextValue::<Method>::new(|ctx| ctx.request().method().clone()))
        .context(ContextValue::<HeaderMap>::new(|ctx| ctx.request().headers().clone()))
        .context(ContextValue::<Arc<Request>>::new(|ctx| ctx.request_arc()))
        .context(ContextValue::<PathMatch>::new(|ctx| ctx.path_match().clone()))
        .request_entity(TextReader)
        .request_entity(BytesReader::<Bytes>::default())
        .request_entity(BytesReader::<Vec<u8>>::default())
        .response_entity(TextWriter)
        .response_entity(BytesWriter::<Bytes>::default())
        .response_entity(BytesWriter::<Vec<u8>>::default())
        .response_entity(UnitWriter)
        .response_entity(StatusWriter)
        .response_entity(ResponseWriter)
}
