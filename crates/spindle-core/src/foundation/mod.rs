//! Foundation layer: the data every dispatch stage works on.

pub mod context;
pub mod descriptor;
pub mod entity;
pub mod media;
pub mod order;
pub mod request;
pub mod response;
pub mod value;

pub use context::{DispatchStage, PathMatch, RequestContext};
pub use descriptor::{HandlerMethod, Metadata, Param, ParamSource, ParamSpec, TypeInfo};
pub use entity::{RequestEntity, ResponseEntity};
pub use media::{MediaType, MediaTypeError, join_media_types};
pub use order::{
    DEFAULT_ORDER, FALLBACK_ORDER, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE, OrderedList, Precedence,
};
pub use request::{Request, RequestBuilder, RequestSignature, decode_component, normalize_path};
pub use response::Response;
pub use value::{HandledValue, Value};
